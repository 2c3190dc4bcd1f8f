use std::collections::{HashMap, HashSet};

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::ServiceError,
    schema::{Id, RecipeFlags},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorAnnotation {
    pub recipes_count: i64,
    pub is_subscribed: bool,
}

pub fn apply_recipe_flags(
    recipe_ids: &[Id],
    favorites: &HashSet<Id>,
    shopping_cart: &HashSet<Id>,
) -> HashMap<Id, RecipeFlags> {
    recipe_ids
        .iter()
        .map(|id| {
            (
                *id,
                RecipeFlags {
                    is_favorited: favorites.contains(id),
                    is_in_shopping_cart: shopping_cart.contains(id),
                },
            )
        })
        .collect()
}

pub fn apply_author_annotations(
    author_ids: &[Id],
    recipe_counts: &HashMap<Id, i64>,
    subscribed: &HashSet<Id>,
) -> HashMap<Id, AuthorAnnotation> {
    author_ids
        .iter()
        .map(|id| {
            (
                *id,
                AuthorAnnotation {
                    recipes_count: recipe_counts.get(id).copied().unwrap_or(0),
                    is_subscribed: subscribed.contains(id),
                },
            )
        })
        .collect()
}

async fn related_ids(
    table: &str,
    target_column: &str,
    viewer: Id,
    ids: &[Id],
    conn: &mut PgConnection,
) -> Result<HashSet<Id>, ServiceError> {
    let rows: Vec<(Id,)> = sqlx::query_as(&format!(
        "SELECT {target_column} FROM {table} WHERE user_id = $1 AND {target_column} = ANY($2)"
    ))
    .bind(viewer)
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// `is_favorited` / `is_in_shopping_cart` for each recipe, two queries per batch.
/// An anonymous viewer gets all-false flags without touching the database.
pub async fn recipe_flags(
    viewer: Option<Id>,
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, RecipeFlags>, ServiceError> {
    let (favorites, shopping_cart) = match viewer {
        Some(viewer) if !recipe_ids.is_empty() => {
            let mut conn = pool.acquire().await?;
            (
                related_ids("favorites", "recipe_id", viewer, recipe_ids, &mut conn).await?,
                related_ids("shopping_carts", "recipe_id", viewer, recipe_ids, &mut conn).await?,
            )
        }
        _ => (HashSet::new(), HashSet::new()),
    };

    Ok(apply_recipe_flags(recipe_ids, &favorites, &shopping_cart))
}

pub async fn author_annotations(
    viewer: Option<Id>,
    author_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<HashMap<Id, AuthorAnnotation>, ServiceError> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let counts: Vec<(Id, i64)> = sqlx::query_as(
        "SELECT author_id, COUNT(*) FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
    )
    .bind(author_ids)
    .fetch_all(&mut *conn)
    .await?;
    let counts: HashMap<Id, i64> = counts.into_iter().collect();

    let subscribed = match viewer {
        Some(viewer) => related_ids("subscriptions", "author_id", viewer, author_ids, conn).await?,
        None => HashSet::new(),
    };

    Ok(apply_author_annotations(author_ids, &counts, &subscribed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_relation_sets() {
        let favorites = HashSet::from([1, 3]);
        let cart = HashSet::from([3]);
        let flags = apply_recipe_flags(&[1, 2, 3], &favorites, &cart);

        assert_eq!(
            flags[&1],
            RecipeFlags {
                is_favorited: true,
                is_in_shopping_cart: false
            }
        );
        assert_eq!(flags[&2], RecipeFlags::default());
        assert_eq!(
            flags[&3],
            RecipeFlags {
                is_favorited: true,
                is_in_shopping_cart: true
            }
        );
    }

    #[test]
    fn authors_without_recipes_count_zero() {
        let counts = HashMap::from([(1, 4)]);
        let subscribed = HashSet::from([2]);
        let annotations = apply_author_annotations(&[1, 2], &counts, &subscribed);

        assert_eq!(
            annotations[&1],
            AuthorAnnotation {
                recipes_count: 4,
                is_subscribed: false
            }
        );
        assert_eq!(
            annotations[&2],
            AuthorAnnotation {
                recipes_count: 0,
                is_subscribed: true
            }
        );
    }

    #[tokio::test]
    async fn anonymous_viewer_never_queries() {
        // A lazy pool never connects unless a query runs.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();

        let flags = recipe_flags(None, &[1, 2, 3], &pool).await.unwrap();
        assert_eq!(flags.len(), 3);
        assert!(flags.values().all(|flag| *flag == RecipeFlags::default()));
    }
}
