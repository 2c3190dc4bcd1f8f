mod common;

use foodgram_sdk::{
    actions::{create_relation, delete_relation, get_recipe, RelationKind, RelationOutput},
    error::ServiceError,
};

#[tokio::test]
async fn every_relation_toggles_and_reports_duplicates() {
    let Some(pool) = common::pool().await else { return };

    let user = common::user(&pool).await;
    let author = common::user(&pool).await;
    let salt = common::ingredient(&pool, "Salt", "g").await;
    let recipe = common::recipe(&pool, author, &[(salt, 5)]).await;

    for kind in RelationKind::ALL {
        let target = match kind {
            RelationKind::Subscription => author,
            _ => recipe,
        };
        let messages = kind.descriptor();

        let created = create_relation(user, target, kind, None, &pool).await.unwrap();
        assert_eq!(created.status, 201);

        match create_relation(user, target, kind, None, &pool).await {
            Err(ServiceError::Conflict(info)) => assert_eq!(info, messages.exists_message),
            other => panic!("{kind:?}: expected conflict, got {other:?}"),
        }

        let deleted = delete_relation(user, target, kind, &pool).await.unwrap();
        assert_eq!(deleted.status, 204);

        match delete_relation(user, target, kind, &pool).await {
            Err(ServiceError::NotFound(info)) => assert_eq!(info, messages.not_found_message),
            other => panic!("{kind:?}: expected not found, got {other:?}"),
        }

        // Toggle is reversible.
        create_relation(user, target, kind, None, &pool).await.unwrap();
    }

    let detail = get_recipe(recipe, Some(user), &pool).await.unwrap().into_body().unwrap();
    assert!(detail.is_favorited);
    assert!(detail.is_in_shopping_cart);
    assert!(detail.author.is_subscribed);
}

#[tokio::test]
async fn subscription_returns_author_with_limited_recipes() {
    let Some(pool) = common::pool().await else { return };

    let user = common::user(&pool).await;
    let author = common::user(&pool).await;
    let flour = common::ingredient(&pool, "Flour", "g").await;
    for _ in 0..3 {
        common::recipe(&pool, author, &[(flour, 200)]).await;
    }

    let output = create_relation(user, author, RelationKind::Subscription, Some(2), &pool)
        .await
        .unwrap()
        .into_body()
        .unwrap();

    match output {
        RelationOutput::Author(author) => {
            assert!(author.author.is_subscribed);
            assert_eq!(author.recipes.len(), 2);
            assert_eq!(author.recipes_count, 3);
        }
        other => panic!("expected author, got {other:?}"),
    }
}

#[tokio::test]
async fn self_subscription_is_a_validation_error() {
    let Some(pool) = common::pool().await else { return };
    let user = common::user(&pool).await;

    match create_relation(user, user, RelationKind::Subscription, None, &pool).await {
        Err(ServiceError::Validation(errors)) => assert!(errors.contains("author")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_targets_are_not_found() {
    let Some(pool) = common::pool().await else { return };
    let user = common::user(&pool).await;

    match create_relation(user, -1, RelationKind::Favorite, None, &pool).await {
        Err(ServiceError::NotFound(info)) => assert_eq!(info, "Recipe not found"),
        other => panic!("expected not found, got {other:?}"),
    }
    match create_relation(user, -1, RelationKind::Subscription, None, &pool).await {
        Err(ServiceError::NotFound(info)) => assert_eq!(info, "User not found"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_duplicate_creates_end_in_one_conflict() {
    let Some(pool) = common::pool().await else { return };

    let user = common::user(&pool).await;
    let author = common::user(&pool).await;
    let salt = common::ingredient(&pool, "Salt", "g").await;
    let recipe = common::recipe(&pool, author, &[(salt, 5)]).await;

    for (kind, target) in [
        (RelationKind::Favorite, recipe),
        (RelationKind::ShoppingCart, recipe),
        (RelationKind::Subscription, author),
    ] {
        let (first, second) = tokio::join!(
            create_relation(user, target, kind, None, &pool),
            create_relation(user, target, kind, None, &pool),
        );

        let mut created = 0;
        for result in [first, second] {
            match result {
                Ok(response) => {
                    assert_eq!(response.status, 201);
                    created += 1;
                }
                Err(ServiceError::Conflict(info)) => {
                    assert_eq!(info, kind.descriptor().exists_message)
                }
                Err(e) => panic!("{kind:?}: unexpected error {e:?}"),
            }
        }
        assert_eq!(created, 1, "{kind:?}");
    }
}

#[tokio::test]
async fn favorite_reply_describes_the_recipe() {
    let Some(pool) = common::pool().await else { return };

    let user = common::user(&pool).await;
    let author = common::user(&pool).await;
    let salt = common::ingredient(&pool, "Salt", "g").await;
    let recipe = common::recipe(&pool, author, &[(salt, 5)]).await;

    match create_relation(user, recipe, RelationKind::Favorite, None, &pool)
        .await
        .unwrap()
        .into_body()
    {
        Some(RelationOutput::Recipe(minified)) => {
            assert_eq!(minified.id, recipe);
            assert_eq!(minified.cooking_time, 15);
        }
        other => panic!("expected recipe, got {other:?}"),
    }
}
