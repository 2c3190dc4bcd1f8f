mod common;

use foodgram_sdk::actions::{create_relation, shopping_list, RelationKind};

#[tokio::test]
async fn salt_from_two_recipes_is_summed() {
    let Some(pool) = common::pool().await else { return };

    let author = common::user(&pool).await;
    let reader = common::user(&pool).await;
    let salt = common::ingredient(&pool, "Salt", "g").await;
    let pepper = common::ingredient(&pool, "Pepper", "g").await;

    for recipe in [
        common::recipe(&pool, author, &[(salt, 5)]).await,
        common::recipe(&pool, author, &[(salt, 3), (pepper, 1)]).await,
    ] {
        create_relation(reader, recipe, RelationKind::ShoppingCart, None, &pool)
            .await
            .unwrap();
    }

    let list = shopping_list(reader, &pool).await.unwrap();
    let amounts: Vec<i64> = list.lines.iter().map(|line| line.amount).collect();

    assert_eq!(list.lines.len(), 2);
    assert!(list.lines[0].name.starts_with("Pepper"));
    assert_eq!(amounts, vec![1, 8]);
    assert!(list.render().starts_with("Shopping list\n\n"));
}

#[tokio::test]
async fn empty_cart_gives_header_only() {
    let Some(pool) = common::pool().await else { return };
    let reader = common::user(&pool).await;

    let list = shopping_list(reader, &pool).await.unwrap();

    assert!(list.is_empty());
    assert_eq!(list.render(), "Shopping list\n\n");
}
