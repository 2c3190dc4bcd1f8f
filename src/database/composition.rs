use std::collections::HashSet;

use serde::Deserialize;

use crate::{
    constants::{
        MAX_COOKING_TIME, MAX_INGREDIENT_AMOUNT, MAX_RECIPE_NAME_LENGTH, MIN_COOKING_TIME,
        MIN_INGREDIENT_AMOUNT,
    },
    error::{FieldErrors, ServiceError},
    schema::{Id, IngredientAmount},
};

pub const REQUIRED_FIELD: &str = "This field is required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
    PartialUpdate,
}

impl WriteMode {
    fn scalars_required(self) -> bool {
        !matches!(self, WriteMode::PartialUpdate)
    }
}

/// Recipe payload as the HTTP layer hands it over.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeForm {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}

/// Scalar columns of a recipe. `None` keeps the stored value on partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFields {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRecipe {
    pub fields: RecipeFields,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

fn ingredient_errors(ingredients: &[IngredientAmount]) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if ingredients.is_empty() {
        errors.add("ingredients", "At least one ingredient is required");
        return errors;
    }

    let mut seen = HashSet::new();
    for ingredient in ingredients {
        if !seen.insert(ingredient.id) {
            errors.add(
                "ingredients",
                format!("Ingredients must not repeat (id {})", ingredient.id),
            );
        }
        if !(MIN_INGREDIENT_AMOUNT..=MAX_INGREDIENT_AMOUNT).contains(&ingredient.amount) {
            errors.add(
                "ingredients",
                format!(
                    "Amount of ingredient {} must be between {MIN_INGREDIENT_AMOUNT} and {MAX_INGREDIENT_AMOUNT}",
                    ingredient.id
                ),
            );
        }
    }
    errors
}

fn tag_errors(tags: &[Id]) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if tags.is_empty() {
        errors.add("tags", "At least one tag is required");
        return errors;
    }

    let mut seen = HashSet::new();
    for tag in tags {
        if !seen.insert(*tag) {
            errors.add("tags", format!("Tags must not repeat (id {tag})"));
        }
    }
    errors
}

/// Rejects an empty list and any ingredient id listed twice, whatever the amounts.
pub fn validate_ingredients(
    ingredients: Vec<IngredientAmount>,
) -> Result<Vec<IngredientAmount>, ServiceError> {
    ingredient_errors(&ingredients).into_result()?;
    Ok(ingredients)
}

pub fn validate_tags(tags: Vec<Id>) -> Result<Vec<Id>, ServiceError> {
    tag_errors(&tags).into_result()?;
    Ok(tags)
}

fn require<T>(value: &Option<T>, field: &str, mode: WriteMode, errors: &mut FieldErrors) {
    if value.is_none() && mode.scalars_required() {
        errors.add(field, REQUIRED_FIELD);
    }
}

fn scalar_errors(form: &RecipeForm, mode: WriteMode) -> FieldErrors {
    let mut errors = FieldErrors::new();

    require(&form.name, "name", mode, &mut errors);
    require(&form.image, "image", mode, &mut errors);
    require(&form.text, "text", mode, &mut errors);
    require(&form.cooking_time, "cooking_time", mode, &mut errors);

    if let Some(name) = &form.name {
        if name.trim().is_empty() {
            errors.add("name", "Name must not be empty");
        } else if name.chars().count() > MAX_RECIPE_NAME_LENGTH {
            errors.add(
                "name",
                format!("Name must be at most {MAX_RECIPE_NAME_LENGTH} characters"),
            );
        }
    }
    if let Some(image) = &form.image {
        if image.trim().is_empty() {
            errors.add("image", "Image must not be empty");
        }
    }
    if let Some(text) = &form.text {
        if text.trim().is_empty() {
            errors.add("text", "Description must not be empty");
        }
    }
    if let Some(cooking_time) = form.cooking_time {
        if !(MIN_COOKING_TIME..=MAX_COOKING_TIME).contains(&cooking_time) {
            errors.add(
                "cooking_time",
                format!("Cooking time must be between {MIN_COOKING_TIME} and {MAX_COOKING_TIME} minutes"),
            );
        }
    }

    errors
}

impl RecipeForm {
    /// Checks the whole payload and reports every offending field at once.
    ///
    /// `tags` and `ingredients` are required in every mode, partial updates
    /// included, because an update always replaces both sets.
    pub fn validate(self, mode: WriteMode) -> Result<ValidRecipe, ServiceError> {
        let mut errors = scalar_errors(&self, mode);

        match &self.tags {
            Some(tags) => errors.merge(tag_errors(tags)),
            None => errors.add("tags", REQUIRED_FIELD),
        }
        match &self.ingredients {
            Some(ingredients) => errors.merge(ingredient_errors(ingredients)),
            None => errors.add("ingredients", REQUIRED_FIELD),
        }

        errors.into_result()?;

        Ok(ValidRecipe {
            fields: RecipeFields {
                name: self.name.map(|name| name.trim().to_owned()),
                image: self.image,
                text: self.text,
                cooking_time: self.cooking_time,
            },
            tags: self.tags.unwrap_or_default(),
            ingredients: self.ingredients.unwrap_or_default(),
        })
    }
}
