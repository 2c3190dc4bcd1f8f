use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{FieldErrors, ServiceError},
    reply::{ActionResult, Response},
    schema::{Id, Ingredient, NewIngredient},
    MAX_INGREDIENT_NAME_LENGTH, MAX_UNIT_LENGTH,
};

// Keeps every insert below the postgres bind parameter limit.
const IMPORT_CHUNK_SIZE: usize = 1000;

pub fn validate_ingredient(ingredient: &NewIngredient) -> Result<(), ServiceError> {
    let mut errors = FieldErrors::new();

    for (field, value, max) in [
        ("name", &ingredient.name, MAX_INGREDIENT_NAME_LENGTH),
        ("measurement_unit", &ingredient.measurement_unit, MAX_UNIT_LENGTH),
    ] {
        if value.trim().is_empty() {
            errors.add(field, "This field may not be blank.");
        } else if value.chars().count() > max {
            errors.add(field, format!("Ensure this field has no more than {max} characters."));
        }
    }

    errors.into_result()
}

/// Escapes `LIKE` wildcards so the prefix matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub async fn create_ingredient(
    ingredient: NewIngredient,
    pool: &Pool<Postgres>,
) -> ActionResult<Ingredient> {
    validate_ingredient(&ingredient)?;

    let row: Option<Ingredient> = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING RETURNING *
    ",
    )
    .bind(ingredient.name.trim())
    .bind(ingredient.measurement_unit.trim())
    .fetch_optional(pool)
    .await?;

    row.map(Response::created).ok_or_else(|| {
        ServiceError::Conflict(String::from(
            "An ingredient with this name and measurement unit already exists",
        ))
    })
}

/// Bulk import; rows already present are skipped. Returns how many were inserted.
pub async fn import_ingredients(
    ingredients: Vec<NewIngredient>,
    pool: &Pool<Postgres>,
) -> ActionResult<u64> {
    for ingredient in &ingredients {
        validate_ingredient(ingredient)?;
    }

    let mut tr = pool.begin().await?;
    let mut inserted = 0;

    for chunk in ingredients.chunks(IMPORT_CHUNK_SIZE) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");
        builder.push_values(chunk, |mut row, ingredient| {
            row.push_bind(ingredient.name.trim().to_owned())
                .push_bind(ingredient.measurement_unit.trim().to_owned());
        });
        builder.push(" ON CONFLICT DO NOTHING");

        inserted += builder.build().execute(&mut *tr).await?.rows_affected();
    }

    tr.commit().await?;
    log::info!("Imported {inserted} of {} ingredients", ingredients.len());

    Ok(Response::ok(inserted))
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> ActionResult<Ingredient> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(Response::ok)
        .ok_or_else(|| ServiceError::NotFound(String::from("Ingredient not found")))
}

/// Ingredients whose name starts with `prefix`; an empty prefix lists everything.
pub async fn search_ingredients(prefix: &str, pool: &Pool<Postgres>) -> ActionResult<Vec<Ingredient>> {
    let list: Vec<Ingredient> = sqlx::query_as(
        "SELECT * FROM ingredients WHERE name LIKE $1 || '%' ESCAPE '\\' ORDER BY name, measurement_unit",
    )
    .bind(escape_like(prefix))
    .fetch_all(pool)
    .await?;

    Ok(Response::ok(list))
}
