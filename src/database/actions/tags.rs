use sqlx::{Pool, Postgres};

use crate::{
    error::{FieldErrors, ServiceError},
    reply::{ActionResult, Response},
    schema::{Id, Tag},
    MAX_SLUG_LENGTH, MAX_TAG_LENGTH,
};

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn validate_tag(name: &str, slug: &str) -> Result<(), ServiceError> {
    let mut errors = FieldErrors::new();

    if name.trim().is_empty() {
        errors.add("name", "This field may not be blank.");
    } else if name.chars().count() > MAX_TAG_LENGTH {
        errors.add("name", format!("Ensure this field has no more than {MAX_TAG_LENGTH} characters."));
    }
    if !is_valid_slug(slug) {
        errors.add("slug", "Slug may contain only latin letters, digits, hyphens and underscores.");
    } else if slug.len() > MAX_SLUG_LENGTH {
        errors.add("slug", format!("Ensure this field has no more than {MAX_SLUG_LENGTH} characters."));
    }

    errors.into_result()
}

pub async fn create_tag(name: &str, slug: &str, pool: &Pool<Postgres>) -> ActionResult<Tag> {
    validate_tag(name, slug)?;

    let tag: Option<Tag> = sqlx::query_as(
        "INSERT INTO tags (name, slug) VALUES ($1, $2) ON CONFLICT DO NOTHING RETURNING *",
    )
    .bind(name.trim())
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    match tag {
        Some(tag) => {
            log::info!("Tag {} ({}) created", tag.id, tag.slug);
            Ok(Response::created(tag))
        }
        None => Err(ServiceError::Conflict(String::from(
            "A tag with this name or slug already exists",
        ))),
    }
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> ActionResult<Tag> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    tag.map(Response::ok)
        .ok_or_else(|| ServiceError::NotFound(String::from("Tag not found")))
}

pub async fn list_tags(pool: &Pool<Postgres>) -> ActionResult<Vec<Tag>> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(Response::ok(list))
}
