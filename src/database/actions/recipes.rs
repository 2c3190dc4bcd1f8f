use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    composition::{RecipeForm, ValidRecipe, WriteMode},
    error::{FieldErrors, ServiceError},
    filter::RecipeFilter,
    reply::{ActionResult, Response},
    schema::{Author, Id, IngredientAmount, Recipe, RecipeDetail, RecipeFlags, RecipeMinified, RecipePart, Tag},
    SHORT_LINK_PREFIX,
};

use super::{list_authors, recipe_flags};

pub async fn get_recipe_row(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ServiceError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_recipe_minified(
    id: Id,
    conn: &mut PgConnection,
) -> Result<RecipeMinified, ServiceError> {
    let row: Option<RecipeMinified> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    row.ok_or_else(|| ServiceError::NotFound(String::from("Recipe not found")))
}

pub async fn list_recipe_parts(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<RecipePart>>, ServiceError> {
    let rows: Vec<(Id, Id, String, String, i32)> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;

    let mut parts: HashMap<Id, Vec<RecipePart>> = HashMap::new();
    rows.into_iter()
        .for_each(|(recipe_id, id, name, measurement_unit, amount)| {
            parts.entry(recipe_id).or_default().push(RecipePart {
                id,
                name,
                measurement_unit,
                amount,
            })
        });

    Ok(parts)
}

pub async fn list_recipe_tags(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<Tag>>, ServiceError> {
    let rows: Vec<(Id, Id, String, String)> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;

    let mut tags: HashMap<Id, Vec<Tag>> = HashMap::new();
    rows.into_iter().for_each(|(recipe_id, id, name, slug)| {
        tags.entry(recipe_id).or_default().push(Tag { id, name, slug })
    });

    Ok(tags)
}

fn assemble_detail(
    recipe: Recipe,
    author: Author,
    tags: Vec<Tag>,
    ingredients: Vec<RecipePart>,
    flags: RecipeFlags,
) -> RecipeDetail {
    RecipeDetail {
        id: recipe.id,
        tags,
        author,
        ingredients,
        is_favorited: flags.is_favorited,
        is_in_shopping_cart: flags.is_in_shopping_cart,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
        pub_date: recipe.pub_date,
    }
}

/// Expands recipe rows with author, tags, ingredients and viewer flags,
/// using a fixed number of queries regardless of how many rows come in.
pub async fn load_details(
    recipes: Vec<Recipe>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, ServiceError> {
    if recipes.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
    let author_ids: Vec<Id> = recipes
        .iter()
        .map(|recipe| recipe.author_id)
        .collect::<HashSet<Id>>()
        .into_iter()
        .collect();

    let mut parts = list_recipe_parts(&ids, pool).await?;
    let mut tags = list_recipe_tags(&ids, pool).await?;
    let flags = recipe_flags(viewer, &ids, pool).await?;
    let authors = list_authors(&author_ids, viewer, pool).await?;

    Ok(recipes
        .into_iter()
        .filter_map(|recipe| {
            let Some(author) = authors.get(&recipe.author_id).cloned() else {
                log::error!("Recipe {} has no author row", recipe.id);
                return None;
            };
            let flags = flags.get(&recipe.id).copied().unwrap_or_default();
            let recipe_tags = tags.remove(&recipe.id).unwrap_or_default();
            let recipe_parts = parts.remove(&recipe.id).unwrap_or_default();

            Some(assemble_detail(recipe, author, recipe_tags, recipe_parts, flags))
        })
        .collect())
}

async fn load_detail(
    id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ServiceError> {
    let recipe = get_recipe_row(id, pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(String::from("Recipe not found")))?;

    load_details(vec![recipe], viewer, pool)
        .await?
        .pop()
        .ok_or_else(|| ServiceError::NotFound(String::from("Recipe not found")))
}

pub async fn get_recipe(
    id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> ActionResult<RecipeDetail> {
    Ok(Response::ok(load_detail(id, viewer, pool).await?))
}

pub async fn fetch_recipes(
    viewer: Option<Id>,
    filter: &RecipeFilter,
    pool: &Pool<Postgres>,
) -> ActionResult<Vec<RecipeDetail>> {
    let rows: Vec<Recipe> = filter
        .query(viewer)
        .build_query_as()
        .fetch_all(pool)
        .await?;

    Ok(Response::ok(load_details(rows, viewer, pool).await?))
}

pub fn recipe_short_link(base_url: &str, id: Id) -> String {
    format!("{}/{SHORT_LINK_PREFIX}/{id}", base_url.trim_end_matches('/'))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortLink {
    #[serde(rename = "short-link")]
    pub short_link: String,
}

pub async fn get_recipe_short_link(
    id: Id,
    base_url: &str,
    pool: &Pool<Postgres>,
) -> ActionResult<ShortLink> {
    get_recipe_row(id, pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(String::from("Recipe not found")))?;

    Ok(Response::ok(ShortLink {
        short_link: recipe_short_link(base_url, id),
    }))
}

fn unknown_ids(requested: &[Id], known: &HashSet<Id>) -> Vec<Id> {
    requested
        .iter()
        .filter(|id| !known.contains(id))
        .copied()
        .collect()
}

async fn known_ids(
    table: &str,
    ids: &[Id],
    conn: &mut PgConnection,
) -> Result<HashSet<Id>, ServiceError> {
    let rows: Vec<(Id,)> = sqlx::query_as(&format!("SELECT id FROM {table} WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// Every referenced tag and ingredient must exist.
async fn ensure_references(recipe: &ValidRecipe, conn: &mut PgConnection) -> Result<(), ServiceError> {
    let mut errors = FieldErrors::new();

    let tags = known_ids("tags", &recipe.tags, conn).await?;
    for id in unknown_ids(&recipe.tags, &tags) {
        errors.add("tags", format!("Tag {id} does not exist"));
    }

    let ingredient_ids: Vec<Id> = recipe.ingredients.iter().map(|i| i.id).collect();
    let ingredients = known_ids("ingredients", &ingredient_ids, conn).await?;
    for id in unknown_ids(&ingredient_ids, &ingredients) {
        errors.add("ingredients", format!("Ingredient {id} does not exist"));
    }

    errors.into_result()
}

async fn set_tags(recipe_id: Id, tags: &[Id], conn: &mut PgConnection) -> Result<(), ServiceError> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) SELECT $1, UNNEST($2::int[])")
        .bind(recipe_id)
        .bind(tags)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Full replace: drop every ingredient row of the recipe, then bulk insert the new set.
async fn set_ingredients(
    recipe_id: Id,
    ingredients: &[IngredientAmount],
    conn: &mut PgConnection,
) -> Result<(), ServiceError> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    if ingredients.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    builder.push_values(ingredients, |mut row, ingredient| {
        row.push_bind(recipe_id)
            .push_bind(ingredient.id)
            .push_bind(ingredient.amount);
    });
    builder.build().execute(&mut *conn).await?;

    Ok(())
}

pub async fn create_recipe(
    author_id: Id,
    form: RecipeForm,
    pool: &Pool<Postgres>,
) -> ActionResult<RecipeDetail> {
    let recipe = form.validate(WriteMode::Create)?;
    let mut tr = pool.begin().await?;

    ensure_references(&recipe, &mut tr).await?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.fields.name)
    .bind(&recipe.fields.image)
    .bind(&recipe.fields.text)
    .bind(recipe.fields.cooking_time)
    .fetch_one(&mut *tr)
    .await?;
    let id = id.0;

    set_tags(id, &recipe.tags, &mut tr).await?;
    set_ingredients(id, &recipe.ingredients, &mut tr).await?;

    tr.commit().await?;
    log::info!("Recipe {id} created by user {author_id}");

    Ok(Response::created(load_detail(id, Some(author_id), pool).await?))
}

/// Locks the recipe row and checks that `user_id` wrote it.
async fn lock_own_recipe(
    recipe_id: Id,
    user_id: Id,
    conn: &mut PgConnection,
) -> Result<Recipe, ServiceError> {
    let recipe: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1 FOR UPDATE")
        .bind(recipe_id)
        .fetch_optional(&mut *conn)
        .await?;

    match recipe {
        Some(recipe) if recipe.author_id == user_id => Ok(recipe),
        Some(_) => Err(ServiceError::Forbidden(String::from(
            "Only the author can change this recipe",
        ))),
        None => Err(ServiceError::NotFound(String::from("Recipe not found"))),
    }
}

/// Replaces tags and ingredients wholesale and updates the scalar columns.
/// On a partial update, absent scalar fields keep their stored values.
pub async fn update_recipe(
    recipe_id: Id,
    user_id: Id,
    form: RecipeForm,
    partial: bool,
    pool: &Pool<Postgres>,
) -> ActionResult<RecipeDetail> {
    let mode = if partial {
        WriteMode::PartialUpdate
    } else {
        WriteMode::Update
    };

    let mut tr = pool.begin().await?;
    lock_own_recipe(recipe_id, user_id, &mut tr).await?;

    let recipe = form.validate(mode)?;
    ensure_references(&recipe, &mut tr).await?;

    set_tags(recipe_id, &recipe.tags, &mut tr).await?;
    set_ingredients(recipe_id, &recipe.ingredients, &mut tr).await?;

    sqlx::query(
        "
        UPDATE recipes SET
        name = COALESCE($1, name),
        image = COALESCE($2, image),
        text = COALESCE($3, text),
        cooking_time = COALESCE($4, cooking_time)
        WHERE id = $5
    ",
    )
    .bind(&recipe.fields.name)
    .bind(&recipe.fields.image)
    .bind(&recipe.fields.text)
    .bind(recipe.fields.cooking_time)
    .bind(recipe_id)
    .execute(&mut *tr)
    .await?;

    tr.commit().await?;
    log::info!("Recipe {recipe_id} updated by user {user_id}");

    Ok(Response::ok(load_detail(recipe_id, Some(user_id), pool).await?))
}

pub async fn delete_recipe(recipe_id: Id, user_id: Id, pool: &Pool<Postgres>) -> ActionResult<()> {
    let mut tr = pool.begin().await?;
    lock_own_recipe(recipe_id, user_id, &mut tr).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await?;

    tr.commit().await?;
    log::info!("Recipe {recipe_id} deleted by user {user_id}");

    Ok(Response::no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_link_serializes_with_hyphenated_key() {
        let link = ShortLink {
            short_link: recipe_short_link("http://localhost", 3),
        };

        assert_eq!(
            serde_json::to_value(&link).unwrap(),
            serde_json::json!({ "short-link": "http://localhost/s/3" })
        );
    }

    #[test]
    fn short_link_strips_trailing_slash() {
        assert_eq!(recipe_short_link("https://food.example/", 12), "https://food.example/s/12");
        assert_eq!(recipe_short_link("http://localhost", 1), "http://localhost/s/1");
    }

    #[test]
    fn unknown_ids_keep_request_order() {
        let known = HashSet::from([1, 3]);
        assert_eq!(unknown_ids(&[5, 1, 4, 3], &known), vec![5, 4]);
        assert!(unknown_ids(&[1, 3], &known).is_empty());
    }
}
