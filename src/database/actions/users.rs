use std::collections::HashMap;

use serde::Serialize;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    cryptography::{hash_password, verify_password},
    error::{FieldErrors, QueryError, ServiceError},
    reply::{ActionResult, Response},
    schema::{Author, AuthorWithRecipes, Id, NewUser, RecipeMinified, User},
    MAX_EMAIL_LENGTH, MAX_NAME_LENGTH, MAX_USERNAME_LENGTH, USER_COUNT_PER_PAGE,
};

use super::author_annotations;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Avatar {
    pub avatar: String,
}

/// Lowercases the domain part only; the local part is case sensitive.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_owned(),
    }
}

pub fn derive_username(email: &str) -> String {
    normalize_email(email)
        .split('@')
        .next()
        .unwrap_or_default()
        .to_owned()
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
}

fn check_length(field: &str, value: &str, max: usize, errors: &mut FieldErrors) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if value.chars().count() > max {
        errors.add(field, format!("Ensure this field has no more than {max} characters."));
    }
}

fn password_error(e: argon2::password_hash::Error) -> ServiceError {
    ServiceError::Database(QueryError::new(format!("Password hashing failed: {e}")))
}

/// Validates a registration payload and fills in the username.
pub fn prepare_user(new_user: NewUser) -> Result<NewUser, ServiceError> {
    let email = normalize_email(&new_user.email);
    let username = new_user
        .username
        .filter(|username| !username.trim().is_empty())
        .unwrap_or_else(|| derive_username(&email));

    let mut errors = FieldErrors::new();
    check_length("email", &email, MAX_EMAIL_LENGTH, &mut errors);
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => errors.add("email", "Enter a valid email address."),
    }
    check_length("username", &username, MAX_USERNAME_LENGTH, &mut errors);
    if !is_valid_username(&username) {
        errors.add(
            "username",
            "Username may contain only letters, digits and @/./+/-/_ characters.",
        );
    }
    check_length("first_name", &new_user.first_name, MAX_NAME_LENGTH, &mut errors);
    check_length("last_name", &new_user.last_name, MAX_NAME_LENGTH, &mut errors);
    if new_user.password.is_empty() {
        errors.add("password", "This field may not be blank.");
    }
    errors.into_result()?;

    Ok(NewUser {
        email,
        username: Some(username),
        ..new_user
    })
}

pub async fn create_user(new_user: NewUser, pool: &Pool<Postgres>) -> ActionResult<User> {
    let new_user = prepare_user(new_user)?;
    let username = new_user.username.unwrap_or_default();

    let taken: Vec<(String, String)> =
        sqlx::query_as("SELECT email, username FROM users WHERE email = $1 OR username = $2")
            .bind(&new_user.email)
            .bind(&username)
            .fetch_all(pool)
            .await?;

    let mut errors = FieldErrors::new();
    if taken.iter().any(|(email, _)| email == &new_user.email) {
        errors.add("email", "A user with this email already exists.");
    }
    if taken.iter().any(|(_, name)| name == &username) {
        errors.add("username", "A user with this username already exists.");
    }
    errors.into_result()?;

    let password = hash_password(&new_user.password).map_err(password_error)?;

    let user: User = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(&new_user.email)
    .bind(&username)
    .bind(new_user.first_name.trim())
    .bind(new_user.last_name.trim())
    .bind(password)
    .fetch_one(pool)
    .await
    .map_err(|e| ServiceError::from(e).integrity_as_conflict("A user with this email or username already exists"))?;

    log::info!("User {} registered as {}", user.id, user.username);
    Ok(Response::created(user))
}

pub async fn get_user_by_id(id: Id, pool: &Pool<Postgres>) -> Result<Option<User>, ServiceError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_email(
    email: &str,
    pool: &Pool<Postgres>,
) -> Result<Option<User>, ServiceError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Public author cards for the given ids, keyed by id.
pub async fn list_authors(
    ids: &[Id],
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Author>, ServiceError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;
    let annotations = author_annotations(viewer, ids, &mut *pool.acquire().await?).await?;

    Ok(users
        .into_iter()
        .map(|user| {
            let is_subscribed = annotations
                .get(&user.id)
                .map(|a| a.is_subscribed)
                .unwrap_or(false);
            (user.id, Author::from_user(user, is_subscribed))
        })
        .collect())
}

pub async fn get_author(id: Id, viewer: Option<Id>, pool: &Pool<Postgres>) -> ActionResult<Author> {
    let mut authors = list_authors(&[id], viewer, pool).await?;

    authors
        .remove(&id)
        .map(Response::ok)
        .ok_or_else(|| ServiceError::NotFound(String::from("User not found")))
}

/// Paging of user lists. A missing limit means one page.
pub fn check_paging(limit: Option<i64>, offset: i64) -> Result<i64, ServiceError> {
    let mut errors = FieldErrors::new();

    let limit = limit.unwrap_or(USER_COUNT_PER_PAGE);
    if limit <= 0 {
        errors.add("limit", "Must be a positive number");
    }
    if offset < 0 {
        errors.add("offset", "Must not be negative");
    }

    errors.into_result().map(|_| limit)
}

pub async fn list_users(
    viewer: Option<Id>,
    limit: Option<i64>,
    offset: i64,
    pool: &Pool<Postgres>,
) -> ActionResult<Vec<Author>> {
    let limit = check_paging(limit, offset)?;
    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY username LIMIT $1 OFFSET $2")
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let ids: Vec<Id> = users.iter().map(|user| user.id).collect();
    let annotations = author_annotations(viewer, &ids, &mut *pool.acquire().await?).await?;

    Ok(Response::ok(
        users
            .into_iter()
            .map(|user| {
                let is_subscribed = annotations
                    .get(&user.id)
                    .map(|a| a.is_subscribed)
                    .unwrap_or(false);
                Author::from_user(user, is_subscribed)
            })
            .collect(),
    ))
}

/// Attaches each author's newest recipes (at most `recipes_limit`) and recipe count.
async fn with_recipes(
    users: Vec<User>,
    viewer: Option<Id>,
    recipes_limit: Option<i64>,
    conn: &mut PgConnection,
) -> Result<Vec<AuthorWithRecipes>, ServiceError> {
    let ids: Vec<Id> = users.iter().map(|user| user.id).collect();
    let annotations = author_annotations(viewer, &ids, conn).await?;

    let rows: Vec<(Id, Id, String, String, i32)> = sqlx::query_as(
        "
        SELECT author_id, id, name, image, cooking_time
        FROM recipes
        WHERE author_id = ANY($1)
        ORDER BY pub_date DESC, id DESC
    ",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let limit = recipes_limit.map(|limit| limit.max(0) as usize);
    let mut recipes: HashMap<Id, Vec<RecipeMinified>> = HashMap::new();
    rows.into_iter()
        .for_each(|(author_id, id, name, image, cooking_time)| {
            let list = recipes.entry(author_id).or_default();
            if limit.map_or(true, |limit| list.len() < limit) {
                list.push(RecipeMinified {
                    id,
                    name,
                    image,
                    cooking_time,
                });
            }
        });

    Ok(users
        .into_iter()
        .map(|user| {
            let annotation = annotations.get(&user.id).copied().unwrap_or_default();
            let author_recipes = recipes.remove(&user.id).unwrap_or_default();
            AuthorWithRecipes {
                author: Author::from_user(user, annotation.is_subscribed),
                recipes: author_recipes,
                recipes_count: annotation.recipes_count,
            }
        })
        .collect())
}

pub async fn get_author_with_recipes(
    author_id: Id,
    viewer: Option<Id>,
    recipes_limit: Option<i64>,
    conn: &mut PgConnection,
) -> Result<AuthorWithRecipes, ServiceError> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(author_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(String::from("User not found")))?;

    with_recipes(vec![user], viewer, recipes_limit, conn)
        .await?
        .pop()
        .ok_or_else(|| ServiceError::NotFound(String::from("User not found")))
}

/// Authors `user_id` follows, alphabetically.
pub async fn list_subscriptions(
    user_id: Id,
    recipes_limit: Option<i64>,
    limit: Option<i64>,
    offset: i64,
    pool: &Pool<Postgres>,
) -> ActionResult<Vec<AuthorWithRecipes>> {
    let limit = check_paging(limit, offset)?;
    let mut conn = pool.acquire().await?;

    let users: Vec<User> = sqlx::query_as(
        "
        SELECT u.*
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Response::ok(
        with_recipes(users, Some(user_id), recipes_limit, &mut conn).await?,
    ))
}

pub async fn set_password(
    user_id: Id,
    current_password: &str,
    new_password: &str,
    pool: &Pool<Postgres>,
) -> ActionResult<()> {
    let user = get_user_by_id(user_id, pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(String::from("User not found")))?;

    if new_password.is_empty() {
        return Err(ServiceError::validation("new_password", "This field may not be blank."));
    }
    if !verify_password(current_password, &user.password).map_err(password_error)? {
        return Err(ServiceError::validation("current_password", "Wrong password."));
    }

    let password = hash_password(new_password).map_err(password_error)?;
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user_id)
        .execute(pool)
        .await?;

    log::info!("User {user_id} changed password");
    Ok(Response::no_content())
}

pub async fn set_avatar(user_id: Id, avatar: &str, pool: &Pool<Postgres>) -> ActionResult<Avatar> {
    if avatar.trim().is_empty() {
        return Err(ServiceError::validation("avatar", "This field is required."));
    }

    let result = sqlx::query("UPDATE users SET avatar = $1 WHERE id = $2")
        .bind(avatar)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound(String::from("User not found")));
    }

    Ok(Response::ok(Avatar {
        avatar: avatar.to_owned(),
    }))
}

pub async fn clear_avatar(user_id: Id, pool: &Pool<Postgres>) -> ActionResult<()> {
    sqlx::query("UPDATE users SET avatar = NULL WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(Response::no_content())
}

/// Recipes, relations and subscriptions in both directions go with the user.
pub async fn delete_user(user_id: Id, pool: &Pool<Postgres>) -> ActionResult<()> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound(String::from("User not found")));
    }

    log::info!("User {user_id} deleted");
    Ok(Response::no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, username: Option<&str>) -> NewUser {
        NewUser {
            email: email.to_owned(),
            username: username.map(str::to_owned),
            first_name: String::from("Ada"),
            last_name: String::from("Lovelace"),
            password: String::from("correct horse"),
        }
    }

    #[test]
    fn email_domain_is_lowercased() {
        assert_eq!(normalize_email(" Ada.L@Example.COM "), "Ada.L@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn username_comes_from_local_part() {
        assert_eq!(derive_username("chef.anna@Mail.org"), "chef.anna");

        let user = prepare_user(new_user("chef.anna@mail.org", None)).unwrap();
        assert_eq!(user.username.as_deref(), Some("chef.anna"));

        let user = prepare_user(new_user("chef.anna@mail.org", Some(" "))).unwrap();
        assert_eq!(user.username.as_deref(), Some("chef.anna"));
    }

    #[test]
    fn explicit_username_is_kept() {
        let user = prepare_user(new_user("a@b.io", Some("anna_k"))).unwrap();
        assert_eq!(user.username.as_deref(), Some("anna_k"));
    }

    #[test]
    fn invalid_registration_names_fields() {
        let mut user = new_user("not-an-email", Some("bad name!"));
        user.first_name = String::new();

        match prepare_user(user) {
            Err(ServiceError::Validation(errors)) => {
                assert!(errors.contains("email"));
                assert!(errors.contains("username"));
                assert!(errors.contains("first_name"));
                assert!(!errors.contains("last_name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn negative_paging_is_rejected_per_field() {
        assert_eq!(check_paging(None, 0).unwrap(), USER_COUNT_PER_PAGE);
        assert_eq!(check_paging(Some(2), 4).unwrap(), 2);

        match check_paging(Some(-1), -6) {
            Err(ServiceError::Validation(errors)) => {
                assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["limit", "offset"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(check_paging(Some(0), 0).is_err());
    }
}
