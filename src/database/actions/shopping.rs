use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::Serialize;
use sqlx::{Pool, Postgres};
use warp::reply::{self, Reply};

use crate::{
    error::ServiceError,
    schema::{CartIngredient, Id},
    SHOPPING_LIST_FILENAME, SHOPPING_LIST_HEADER,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl Display for ShoppingListLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) — {}", self.name, self.measurement_unit, self.amount)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShoppingList {
    pub lines: Vec<ShoppingListLine>,
}

impl ShoppingList {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Header, blank line, then one line per ingredient.
    pub fn render(&self) -> String {
        let mut out = format!("{SHOPPING_LIST_HEADER}\n\n");
        for line in &self.lines {
            out.push_str(&format!("{line}\n"));
        }
        out
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.render().into_bytes()
    }
}

impl Reply for ShoppingList {
    fn into_response(self) -> reply::Response {
        reply::with_header(
            self.render(),
            "Content-Disposition",
            format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
        )
        .into_response()
    }
}

/// Sums amounts per (name, unit), ordered by name ignoring case.
///
/// Rows are keyed by what the reader sees, not by ingredient id, so two
/// ingredient records sharing a name and unit collapse into one line.
/// Names that differ only in case fall back to codepoint order.
pub fn aggregate(rows: Vec<CartIngredient>) -> ShoppingList {
    let mut groups: BTreeMap<(String, String), i64> = BTreeMap::new();
    rows.into_iter().for_each(|row| {
        *groups.entry((row.name, row.measurement_unit)).or_insert(0) += i64::from(row.amount);
    });

    let mut lines: Vec<ShoppingListLine> = groups
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingListLine {
            name,
            measurement_unit,
            amount,
        })
        .collect();
    lines.sort_by_cached_key(|line| {
        (
            line.name.to_lowercase(),
            line.name.clone(),
            line.measurement_unit.clone(),
        )
    });

    ShoppingList { lines }
}

pub async fn fetch_cart_ingredients(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartIngredient>, ServiceError> {
    let rows: Vec<CartIngredient> = sqlx::query_as(
        "
        SELECT ri.recipe_id, ri.ingredient_id, i.name, i.measurement_unit, ri.amount
        FROM shopping_carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn shopping_list(user_id: Id, pool: &Pool<Postgres>) -> Result<ShoppingList, ServiceError> {
    let rows = fetch_cart_ingredients(user_id, pool).await?;
    log::trace!("> Aggregating {} cart rows for user {user_id}", rows.len());

    Ok(aggregate(rows))
}
