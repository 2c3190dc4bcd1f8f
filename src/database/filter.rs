use sqlx::{Postgres, QueryBuilder};

use crate::{constants::RECIPE_COUNT_PER_PAGE, error::ServiceError, form::Form, schema::Id};

/// Supported recipe list filters. Anything else in the query string is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RecipeFilter {
    fn default() -> Self {
        Self {
            author: None,
            tags: vec![],
            is_favorited: false,
            is_in_shopping_cart: false,
            limit: RECIPE_COUNT_PER_PAGE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipePredicate {
    Author(Id),
    AnyTagSlug(Vec<String>),
    FavoritedBy(Id),
    InShoppingCartOf(Id),
}

impl RecipePredicate {
    /// Appends the condition for table alias `r`.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            RecipePredicate::Author(author) => {
                builder.push("r.author_id = ").push_bind(*author);
            }
            RecipePredicate::AnyTagSlug(slugs) => {
                builder
                    .push("EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(")
                    .push_bind(slugs.clone())
                    .push("))");
            }
            RecipePredicate::FavoritedBy(user) => {
                builder
                    .push("EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                    .push_bind(*user)
                    .push(")");
            }
            RecipePredicate::InShoppingCartOf(user) => {
                builder
                    .push("EXISTS (SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = ")
                    .push_bind(*user)
                    .push(")");
            }
        }
    }
}

impl RecipeFilter {
    pub fn from_form(form: &Form) -> Result<Self, ServiceError> {
        let limit = form
            .get_number::<i64>("limit")?
            .unwrap_or(RECIPE_COUNT_PER_PAGE);
        if limit <= 0 {
            return Err(ServiceError::validation("limit", "Must be a positive number"));
        }

        let page = form.get_number::<i64>("page")?.unwrap_or(1);
        if page <= 0 {
            return Err(ServiceError::validation("page", "Must be a positive number"));
        }

        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| ServiceError::validation("page", "Page is out of range"))?;

        Ok(Self {
            author: form.get_number("author")?,
            tags: form
                .get_all("tags")
                .iter()
                .filter(|slug| !slug.is_empty())
                .cloned()
                .collect(),
            is_favorited: form.get_bool("is_favorited")?.unwrap_or(false),
            is_in_shopping_cart: form.get_bool("is_in_shopping_cart")?.unwrap_or(false),
            limit,
            offset,
        })
    }

    /// Relation filters only apply to a signed-in viewer.
    pub fn predicates(&self, viewer: Option<Id>) -> Vec<RecipePredicate> {
        let mut predicates = vec![];

        if let Some(author) = self.author {
            predicates.push(RecipePredicate::Author(author));
        }
        if !self.tags.is_empty() {
            predicates.push(RecipePredicate::AnyTagSlug(self.tags.clone()));
        }
        if let Some(viewer) = viewer {
            if self.is_favorited {
                predicates.push(RecipePredicate::FavoritedBy(viewer));
            }
            if self.is_in_shopping_cart {
                predicates.push(RecipePredicate::InShoppingCartOf(viewer));
            }
        }

        predicates
    }

    /// `SELECT r.*` over recipes with every predicate applied, newest first.
    pub fn query(&self, viewer: Option<Id>) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT r.* FROM recipes r");

        for (n, predicate) in self.predicates(viewer).iter().enumerate() {
            builder.push(if n == 0 { " WHERE " } else { " AND " });
            predicate.push_sql(&mut builder);
        }

        builder
            .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
            .push_bind(self.limit)
            .push(" OFFSET ")
            .push_bind(self.offset);

        builder
    }
}

/// `recipes_limit` is honoured only when it is a plain non-negative number.
pub fn recipes_limit(form: &Form) -> Option<i64> {
    form.get_str("recipes_limit")
        .filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
        .and_then(|value| value.parse().ok())
}
