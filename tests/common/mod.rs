//! Shared fixtures for the database-backed tests.
//!
//! Every test here needs a Postgres instance reachable through `DATABASE_URL`.
//! Without it the tests return early so the unit suite still runs anywhere.

#![allow(dead_code)]

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use foodgram_sdk::{
    actions::{create_ingredient, create_recipe, create_tag, create_user},
    composition::RecipeForm,
    migrate,
    schema::{Id, IngredientAmount, NewIngredient, NewUser},
};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

static COUNTER: AtomicU32 = AtomicU32::new(0);

pub async fn pool() -> Option<Pool<Postgres>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    migrate(&pool).await.expect("migrations");
    Some(pool)
}

/// Suffix that keeps rows from concurrent or repeated runs apart.
pub fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}{nanos}x{n}")
}

pub async fn user(pool: &Pool<Postgres>) -> Id {
    let name = unique("user");
    let new_user = NewUser {
        email: format!("{name}@example.com"),
        username: Some(name),
        first_name: String::from("Test"),
        last_name: String::from("User"),
        password: String::from("correct horse battery staple"),
    };
    create_user(new_user, pool).await.unwrap().into_body().unwrap().id
}

pub async fn tag(pool: &Pool<Postgres>) -> Id {
    let slug = unique("t");
    create_tag(&slug, &slug, pool).await.unwrap().into_body().unwrap().id
}

pub async fn ingredient(pool: &Pool<Postgres>, name: &str, unit: &str) -> Id {
    let ingredient = NewIngredient {
        name: unique(name),
        measurement_unit: unit.to_owned(),
    };
    create_ingredient(ingredient, pool)
        .await
        .unwrap()
        .into_body()
        .unwrap()
        .id
}

pub fn form(tags: Vec<Id>, ingredients: &[(Id, i32)]) -> RecipeForm {
    RecipeForm {
        name: Some(unique("Recipe ")),
        image: Some(String::from("recipes/images/dish.png")),
        text: Some(String::from("Mix and serve.")),
        cooking_time: Some(15),
        tags: Some(tags),
        ingredients: Some(
            ingredients
                .iter()
                .map(|&(id, amount)| IngredientAmount { id, amount })
                .collect(),
        ),
    }
}

pub async fn recipe(pool: &Pool<Postgres>, author_id: Id, ingredients: &[(Id, i32)]) -> Id {
    let tag_id = tag(pool).await;
    create_recipe(author_id, form(vec![tag_id], ingredients), pool)
        .await
        .unwrap()
        .into_body()
        .unwrap()
        .id
}
