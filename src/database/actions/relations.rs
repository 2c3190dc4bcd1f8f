use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};

use crate::{
    error::ServiceError,
    reply::{ActionResult, Response},
    schema::{AuthorWithRecipes, Id, RecipeMinified},
};

use super::{get_author_with_recipes, get_recipe_minified};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationTarget {
    Recipe,
    Author,
}

impl RelationTarget {
    fn table(self) -> &'static str {
        match self {
            RelationTarget::Recipe => "recipes",
            RelationTarget::Author => "users",
        }
    }

    pub fn not_found_message(self) -> &'static str {
        match self {
            RelationTarget::Recipe => "Recipe not found",
            RelationTarget::Author => "User not found",
        }
    }
}

/// Everything that differs between the user-to-object relations.
#[derive(Debug)]
pub struct RelationDescriptor {
    pub table: &'static str,
    pub user_column: &'static str,
    pub target_column: &'static str,
    pub target: RelationTarget,
    pub check_self: bool,
    pub exists_message: &'static str,
    pub not_found_message: &'static str,
    pub self_message: &'static str,
}

const FAVORITE: RelationDescriptor = RelationDescriptor {
    table: "favorites",
    user_column: "user_id",
    target_column: "recipe_id",
    target: RelationTarget::Recipe,
    check_self: false,
    exists_message: "Recipe is already in favorites",
    not_found_message: "Recipe is not in favorites",
    self_message: "",
};

const SHOPPING_CART: RelationDescriptor = RelationDescriptor {
    table: "shopping_carts",
    user_column: "user_id",
    target_column: "recipe_id",
    target: RelationTarget::Recipe,
    check_self: false,
    exists_message: "Recipe is already in the shopping cart",
    not_found_message: "Recipe is not in the shopping cart",
    self_message: "",
};

const SUBSCRIPTION: RelationDescriptor = RelationDescriptor {
    table: "subscriptions",
    user_column: "user_id",
    target_column: "author_id",
    target: RelationTarget::Author,
    check_self: true,
    exists_message: "You are already subscribed to this author",
    not_found_message: "You are not subscribed to this author",
    self_message: "You cannot subscribe to yourself",
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Favorite,
    ShoppingCart,
    Subscription,
}

impl RelationKind {
    pub const ALL: [RelationKind; 3] = [
        RelationKind::Favorite,
        RelationKind::ShoppingCart,
        RelationKind::Subscription,
    ];

    pub fn descriptor(self) -> &'static RelationDescriptor {
        match self {
            RelationKind::Favorite => &FAVORITE,
            RelationKind::ShoppingCart => &SHOPPING_CART,
            RelationKind::Subscription => &SUBSCRIPTION,
        }
    }
}

impl RelationDescriptor {
    pub fn check_self_relation(&self, user_id: Id, target_id: Id) -> Result<(), ServiceError> {
        if self.check_self && user_id == target_id {
            return Err(ServiceError::validation(
                self.target_column.trim_end_matches("_id"),
                self.self_message,
            ));
        }
        Ok(())
    }

    fn lookup_sql(&self) -> String {
        format!(
            "SELECT id FROM {} WHERE id = $1 FOR SHARE",
            self.target.table()
        )
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            self.table, self.user_column, self.target_column
        )
    }

    fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {} = $1 AND {} = $2",
            self.table, self.user_column, self.target_column
        )
    }
}

/// What a freshly created relation looks like to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RelationOutput {
    Recipe(RecipeMinified),
    Author(AuthorWithRecipes),
}

/// Links `user_id` to `target_id` with the given relation.
///
/// The existence check and the insert share one transaction, and the insert
/// itself is `ON CONFLICT DO NOTHING`, so two racing requests end with one
/// success and one `Conflict`.
pub async fn create_relation(
    user_id: Id,
    target_id: Id,
    kind: RelationKind,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> ActionResult<RelationOutput> {
    let descriptor = kind.descriptor();
    let mut tr = pool.begin().await?;

    let target: Option<(Id,)> = sqlx::query_as(&descriptor.lookup_sql())
        .bind(target_id)
        .fetch_optional(&mut *tr)
        .await?;
    if target.is_none() {
        return Err(ServiceError::NotFound(
            descriptor.target.not_found_message().to_owned(),
        ));
    }

    descriptor.check_self_relation(user_id, target_id)?;

    let result = sqlx::query(&descriptor.insert_sql())
        .bind(user_id)
        .bind(target_id)
        .execute(&mut *tr)
        .await
        .map_err(|e| ServiceError::from(e).integrity_as_conflict(descriptor.exists_message))?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::Conflict(descriptor.exists_message.to_owned()));
    }

    // The target is still locked here.
    let output = match descriptor.target {
        RelationTarget::Recipe => RelationOutput::Recipe(get_recipe_minified(target_id, &mut tr).await?),
        RelationTarget::Author => RelationOutput::Author(
            get_author_with_recipes(target_id, Some(user_id), recipes_limit, &mut tr).await?,
        ),
    };

    tr.commit().await?;
    log::info!("{kind:?} created: user {user_id} -> {target_id}");

    Ok(Response::created(output))
}

/// Removes the relation row; the target itself is never looked up.
pub async fn delete_relation(
    user_id: Id,
    target_id: Id,
    kind: RelationKind,
    pool: &Pool<Postgres>,
) -> ActionResult<()> {
    let descriptor = kind.descriptor();

    let result = sqlx::query(&descriptor.delete_sql())
        .bind(user_id)
        .bind(target_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound(
            descriptor.not_found_message.to_owned(),
        ));
    }

    log::info!("{kind:?} removed: user {user_id} -> {target_id}");
    Ok(Response::no_content())
}
