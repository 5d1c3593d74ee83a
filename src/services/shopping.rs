use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::{
    constants::SHOPPING_LIST_HEADER,
    error::Error,
    jwt::SessionData,
    permissions::ActionType,
    schema::{CartPart, Id},
    store::RecipeStore,
};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

/// Rendered list plus the attachment name it is served under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListExport {
    pub filename: String,
    pub body: String,
}

/// Groups by `(name, unit)` and sums amounts. Output is sorted by name, then
/// unit.
pub fn merge_parts(parts: Vec<CartPart>) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for part in parts {
        *totals
            .entry((part.name, part.measurement_unit))
            .or_default() += i64::from(part.amount);
    }

    totals
        .into_iter()
        .map(|((name, measurement_unit), total_amount)| ShoppingListItem {
            name,
            measurement_unit,
            total_amount,
        })
        .collect()
}

pub async fn aggregate(
    store: &dyn RecipeStore,
    user_id: Id,
) -> Result<Vec<ShoppingListItem>, Error> {
    Ok(merge_parts(store.list_cart_parts(user_id).await?))
}

pub fn render(items: &[ShoppingListItem]) -> String {
    let mut body = format!("{SHOPPING_LIST_HEADER}\n");
    for item in items {
        // Writing into a String cannot fail.
        let _ = writeln!(
            body,
            "- {} ({}) - {}",
            item.name, item.measurement_unit, item.total_amount
        );
    }
    body
}

pub fn attachment_name(username: &str) -> String {
    format!("{username}_shopping_list.txt")
}

pub async fn export(
    store: &dyn RecipeStore,
    session: &SessionData,
) -> Result<ShoppingListExport, Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let items = aggregate(store, session.user_id).await?;
    log::trace!(
        "> Exporting {} shopping list items for user {}",
        items.len(),
        session.user_id
    );

    Ok(ShoppingListExport {
        filename: attachment_name(&session.username),
        body: render(&items),
    })
}
