use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::Error;

use super::{
    schema::{
        CartPart, Id, Ingredient, Recipe, RecipeDraft, RecipeFilter, RecipePart, RelationKind,
        ShortLink, Tag, User,
    },
    store::RecipeStore,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<Id, User>,
    ingredients: BTreeMap<Id, Ingredient>,
    tags: BTreeMap<Id, Tag>,
    recipes: BTreeMap<Id, Recipe>,
    /// `(recipe, ingredient, amount)` in insertion order.
    recipe_ingredients: Vec<(Id, Id, i32)>,
    recipe_tags: HashSet<(Id, Id)>,
    favorites: HashSet<(Id, Id)>,
    shopping_cart: HashSet<(Id, Id)>,
    subscriptions: HashSet<(Id, Id)>,
    short_links: BTreeMap<String, Id>,
    next_id: Id,
}

impl Tables {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn relations(&mut self, kind: RelationKind) -> &mut HashSet<(Id, Id)> {
        match kind {
            RelationKind::Favorite => &mut self.favorites,
            RelationKind::ShoppingCart => &mut self.shopping_cart,
        }
    }

    /// Mirrors the foreign keys and unique constraints of the recipe tables,
    /// so a rejected draft leaves nothing behind.
    fn check_draft(&self, recipe_id: Id, draft: &RecipeDraft) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for (ingredient_id, _) in &draft.ingredients {
            if !self.ingredients.contains_key(ingredient_id) {
                return Err(constraint("recipe_ingredients_ingredient_id_fkey"));
            }
            if !seen.insert((recipe_id, *ingredient_id)) {
                return Err(constraint("recipe_ingredients_recipe_id_ingredient_id_key"));
            }
        }
        let mut seen = HashSet::new();
        for tag_id in &draft.tags {
            if !self.tags.contains_key(tag_id) {
                return Err(constraint("recipe_tags_tag_id_fkey"));
            }
            if !seen.insert(*tag_id) {
                return Err(constraint("recipe_tags_pkey"));
            }
        }
        Ok(())
    }

    fn write_associations(&mut self, recipe_id: Id, draft: &RecipeDraft) {
        self.recipe_ingredients.extend(
            draft
                .ingredients
                .iter()
                .map(|(ingredient_id, amount)| (recipe_id, *ingredient_id, *amount)),
        );
        self.recipe_tags
            .extend(draft.tags.iter().map(|tag_id| (recipe_id, *tag_id)));
    }

    fn clear_associations(&mut self, recipe_id: Id) {
        self.recipe_ingredients.retain(|(id, _, _)| *id != recipe_id);
        self.recipe_tags.retain(|(id, _)| *id != recipe_id);
    }

    fn recipe_has_tag(&self, recipe_id: Id, slugs: &[String]) -> bool {
        self.recipe_tags.iter().any(|(id, tag_id)| {
            *id == recipe_id
                && self
                    .tags
                    .get(tag_id)
                    .is_some_and(|tag| slugs.contains(&tag.slug))
        })
    }
}

fn constraint(name: &str) -> Error {
    Error::Query(crate::error::QueryError::new(format!(
        "violates constraint \"{name}\""
    )))
}

/// In-process `RecipeStore`. Every operation takes the single table lock, so
/// multi-table writes are all-or-nothing like a Postgres transaction.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    relation_lookups: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, username: &str, role: super::schema::UserRole) -> User {
        let mut tables = self.tables.lock().await;
        let user = User {
            id: tables.next_id(),
            username: username.to_owned(),
            email: format!("{username}@example.com"),
            first_name: username.to_owned(),
            last_name: String::new(),
            role,
            avatar: None,
        };
        tables.users.insert(user.id, user.clone());
        user
    }

    pub async fn add_ingredient(&self, name: &str, measurement_unit: &str) -> Result<Ingredient, Error> {
        let mut tables = self.tables.lock().await;
        if tables
            .ingredients
            .values()
            .any(|i| i.name == name && i.measurement_unit == measurement_unit)
        {
            return Err(constraint("ingredients_name_measurement_unit_key"));
        }
        let ingredient = Ingredient {
            id: tables.next_id(),
            name: name.to_owned(),
            measurement_unit: measurement_unit.to_owned(),
        };
        tables.ingredients.insert(ingredient.id, ingredient.clone());
        Ok(ingredient)
    }

    pub async fn add_tag(&self, name: &str, slug: &str) -> Result<Tag, Error> {
        let mut tables = self.tables.lock().await;
        if tables.tags.values().any(|t| t.slug == slug) {
            return Err(constraint("tags_slug_key"));
        }
        let tag = Tag {
            id: tables.next_id(),
            name: name.to_owned(),
            slug: slug.to_owned(),
        };
        tables.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    /// Deletes a user together with everything the foreign keys cascade to.
    pub async fn delete_user(&self, id: Id) -> bool {
        let mut tables = self.tables.lock().await;
        if tables.users.remove(&id).is_none() {
            return false;
        }
        let owned: Vec<Id> = tables
            .recipes
            .values()
            .filter(|recipe| recipe.author_id == id)
            .map(|recipe| recipe.id)
            .collect();
        for recipe_id in owned {
            remove_recipe(&mut tables, recipe_id);
        }
        tables.favorites.retain(|(user_id, _)| *user_id != id);
        tables.shopping_cart.retain(|(user_id, _)| *user_id != id);
        tables
            .subscriptions
            .retain(|(user_id, following_id)| *user_id != id && *following_id != id);
        true
    }

    /// Number of favorite/cart existence checks served so far.
    pub fn relation_lookups(&self) -> u64 {
        self.relation_lookups.load(Ordering::Relaxed)
    }
}

fn remove_recipe(tables: &mut Tables, recipe_id: Id) -> bool {
    if tables.recipes.remove(&recipe_id).is_none() {
        return false;
    }
    tables.clear_associations(recipe_id);
    tables.favorites.retain(|(_, id)| *id != recipe_id);
    tables.shopping_cart.retain(|(_, id)| *id != recipe_id);
    tables.short_links.retain(|_, id| *id != recipe_id);
    true
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn list_ingredients(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>, Error> {
        let tables = self.tables.lock().await;
        let prefix = name_prefix.unwrap_or("").to_lowercase();
        let mut rows: Vec<Ingredient> = tables
            .ingredients
            .values()
            .filter(|i| i.name.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.name, &a.measurement_unit).cmp(&(&b.name, &b.measurement_unit))
        });
        Ok(rows)
    }

    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, Error> {
        Ok(self.tables.lock().await.ingredients.get(&id).cloned())
    }

    async fn existing_ingredient_ids(&self, ids: &[Id]) -> Result<HashSet<Id>, Error> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| tables.ingredients.contains_key(id))
            .collect())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let mut rows: Vec<Tag> = self.tables.lock().await.tags.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, Error> {
        Ok(self.tables.lock().await.tags.get(&id).cloned())
    }

    async fn existing_tag_ids(&self, ids: &[Id]) -> Result<HashSet<Id>, Error> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| tables.tags.contains_key(id))
            .collect())
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>, Error> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn set_user_avatar(&self, id: Id, avatar: Option<&str>) -> Result<(), Error> {
        if let Some(user) = self.tables.lock().await.users.get_mut(&id) {
            user.avatar = avatar.map(str::to_owned);
        }
        Ok(())
    }

    async fn insert_recipe(&self, author_id: Id, draft: &RecipeDraft) -> Result<Id, Error> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&author_id) {
            return Err(constraint("recipes_author_id_fkey"));
        }
        let id = tables.next_id();
        tables.check_draft(id, draft)?;

        tables.recipes.insert(
            id,
            Recipe {
                id,
                author_id,
                name: draft.name.clone(),
                image: draft.image.clone().unwrap_or_default(),
                text: draft.text.clone(),
                cooking_time: draft.cooking_time,
                pub_date: Utc::now(),
            },
        );
        tables.write_associations(id, draft);
        Ok(id)
    }

    async fn replace_recipe(&self, id: Id, draft: &RecipeDraft) -> Result<(), Error> {
        let mut tables = self.tables.lock().await;
        if !tables.recipes.contains_key(&id) {
            return Err(Error::not_found("Recipe"));
        }
        tables.check_draft(id, draft)?;

        if let Some(recipe) = tables.recipes.get_mut(&id) {
            recipe.name = draft.name.clone();
            recipe.text = draft.text.clone();
            recipe.cooking_time = draft.cooking_time;
            if let Some(image) = &draft.image {
                recipe.image = image.clone();
            }
        }
        tables.clear_associations(id);
        tables.write_associations(id, draft);
        Ok(())
    }

    async fn delete_recipe(&self, id: Id) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;
        Ok(remove_recipe(&mut tables, id))
    }

    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, Error> {
        Ok(self.tables.lock().await.recipes.get(&id).cloned())
    }

    async fn list_recipe_parts(&self, recipe_id: Id) -> Result<Vec<RecipePart>, Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .recipe_ingredients
            .iter()
            .filter(|(id, _, _)| *id == recipe_id)
            .filter_map(|(_, ingredient_id, amount)| {
                tables.ingredients.get(ingredient_id).map(|i| RecipePart {
                    recipe_id,
                    ingredient_id: i.id,
                    name: i.name.clone(),
                    measurement_unit: i.measurement_unit.clone(),
                    amount: *amount,
                })
            })
            .collect())
    }

    async fn list_recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Tag> = tables
            .recipe_tags
            .iter()
            .filter(|(id, _)| *id == recipe_id)
            .filter_map(|(_, tag_id)| tables.tags.get(tag_id).cloned())
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn fetch_recipes(&self, filter: &RecipeFilter) -> Result<(Vec<Recipe>, i64), Error> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<&Recipe> = tables
            .recipes
            .values()
            .filter(|r| filter.author.map_or(true, |author| r.author_id == author))
            .filter(|r| filter.tags.is_empty() || tables.recipe_has_tag(r.id, &filter.tags))
            .filter(|r| {
                filter
                    .favorited_by
                    .map_or(true, |user| tables.favorites.contains(&(user, r.id)))
            })
            .filter(|r| {
                filter
                    .in_cart_of
                    .map_or(true, |user| tables.shopping_cart.contains(&(user, r.id)))
            })
            .collect();
        rows.sort_by(|a, b| (b.pub_date, b.id).cmp(&(a.pub_date, a.id)));

        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn list_author_recipes(
        &self,
        author_id: Id,
        limit: Option<usize>,
    ) -> Result<Vec<Recipe>, Error> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Recipe> = tables
            .recipes
            .values()
            .filter(|r| r.author_id == author_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.pub_date, b.id).cmp(&(a.pub_date, a.id)));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn count_author_recipes(&self, author_id: Id) -> Result<i64, Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .recipes
            .values()
            .filter(|r| r.author_id == author_id)
            .count() as i64)
    }

    async fn relation_exists(
        &self,
        kind: RelationKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        self.relation_lookups.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.tables.lock().await;
        Ok(tables.relations(kind).contains(&(user_id, recipe_id)))
    }

    async fn insert_relation(
        &self,
        kind: RelationKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) || !tables.recipes.contains_key(&recipe_id) {
            return Err(constraint(&format!("{}_recipe_id_fkey", kind.table())));
        }
        Ok(tables.relations(kind).insert((user_id, recipe_id)))
    }

    async fn delete_relation(
        &self,
        kind: RelationKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;
        Ok(tables.relations(kind).remove(&(user_id, recipe_id)))
    }

    async fn list_cart_parts(&self, user_id: Id) -> Result<Vec<CartPart>, Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .recipe_ingredients
            .iter()
            .filter(|(recipe_id, _, _)| tables.shopping_cart.contains(&(user_id, *recipe_id)))
            .filter_map(|(_, ingredient_id, amount)| {
                tables.ingredients.get(ingredient_id).map(|i| CartPart {
                    name: i.name.clone(),
                    measurement_unit: i.measurement_unit.clone(),
                    amount: *amount,
                })
            })
            .collect())
    }

    async fn subscription_exists(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        let tables = self.tables.lock().await;
        Ok(tables.subscriptions.contains(&(user_id, following_id)))
    }

    async fn insert_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;
        if user_id == following_id {
            return Err(constraint("prevent_self_follow"));
        }
        if !tables.users.contains_key(&user_id) || !tables.users.contains_key(&following_id) {
            return Err(constraint("subscriptions_following_id_fkey"));
        }
        Ok(tables.subscriptions.insert((user_id, following_id)))
    }

    async fn delete_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;
        Ok(tables.subscriptions.remove(&(user_id, following_id)))
    }

    async fn list_subscriptions(
        &self,
        user_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<User> = tables
            .subscriptions
            .iter()
            .filter(|(id, _)| *id == user_id)
            .filter_map(|(_, following_id)| tables.users.get(following_id).cloned())
            .collect();
        rows.sort_by(|a, b| a.username.cmp(&b.username));

        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_short_link(&self, short_code: &str) -> Result<Option<ShortLink>, Error> {
        let tables = self.tables.lock().await;
        Ok(tables.short_links.get(short_code).map(|recipe_id| ShortLink {
            short_code: short_code.to_owned(),
            recipe_id: *recipe_id,
        }))
    }

    async fn find_recipe_short_link(&self, recipe_id: Id) -> Result<Option<ShortLink>, Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .short_links
            .iter()
            .find(|(_, id)| **id == recipe_id)
            .map(|(short_code, _)| ShortLink {
                short_code: short_code.clone(),
                recipe_id,
            }))
    }

    async fn insert_short_link(&self, short_code: &str, recipe_id: Id) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;
        if !tables.recipes.contains_key(&recipe_id) {
            return Err(constraint("short_links_recipe_id_fkey"));
        }
        if tables.short_links.contains_key(short_code)
            || tables.short_links.values().any(|id| *id == recipe_id)
        {
            return Ok(false);
        }
        tables.short_links.insert(short_code.to_owned(), recipe_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::UserRole;

    fn draft(tags: Vec<Id>, ingredients: Vec<(Id, i32)>) -> RecipeDraft {
        RecipeDraft {
            name: "Pancakes".into(),
            text: "Mix and fry".into(),
            cooking_time: 20,
            image: Some("recipes/a.png".into()),
            tags,
            ingredients,
        }
    }

    #[tokio::test]
    async fn rejected_draft_leaves_no_orphan_recipe() {
        let store = MemoryStore::new();
        let author = store.add_user("alice", UserRole::User).await;
        let flour = store.add_ingredient("flour", "g").await.unwrap();
        let tag = store.add_tag("Breakfast", "breakfast").await.unwrap();

        let result = store
            .insert_recipe(author.id, &draft(vec![tag.id], vec![(flour.id, 1), (9999, 1)]))
            .await;
        assert!(result.is_err());

        let (rows, total) = store
            .fetch_recipes(&RecipeFilter {
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn unique_pairs_are_enforced_by_the_store() {
        let store = MemoryStore::new();
        let author = store.add_user("alice", UserRole::User).await;
        let flour = store.add_ingredient("flour", "g").await.unwrap();
        let tag = store.add_tag("Breakfast", "breakfast").await.unwrap();
        let recipe = store
            .insert_recipe(author.id, &draft(vec![tag.id], vec![(flour.id, 1)]))
            .await
            .unwrap();

        assert!(store
            .insert_relation(RelationKind::Favorite, author.id, recipe)
            .await
            .unwrap());
        assert!(!store
            .insert_relation(RelationKind::Favorite, author.id, recipe)
            .await
            .unwrap());
        assert!(store.add_ingredient("flour", "g").await.is_err());
        assert!(store.add_tag("Other", "breakfast").await.is_err());
        assert!(store.insert_subscription(author.id, author.id).await.is_err());
    }

    #[tokio::test]
    async fn deleting_the_author_cascades_to_recipes() {
        let store = MemoryStore::new();
        let author = store.add_user("alice", UserRole::User).await;
        let reader = store.add_user("bob", UserRole::User).await;
        let flour = store.add_ingredient("flour", "g").await.unwrap();
        let tag = store.add_tag("Breakfast", "breakfast").await.unwrap();
        let recipe = store
            .insert_recipe(author.id, &draft(vec![tag.id], vec![(flour.id, 1)]))
            .await
            .unwrap();
        store
            .insert_relation(RelationKind::ShoppingCart, reader.id, recipe)
            .await
            .unwrap();

        assert!(store.delete_user(author.id).await);
        assert!(store.get_recipe(recipe).await.unwrap().is_none());
        assert!(store.list_cart_parts(reader.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replacing_a_missing_recipe_is_not_found() {
        let store = MemoryStore::new();
        let flour = store.add_ingredient("flour", "g").await.unwrap();
        let tag = store.add_tag("Breakfast", "breakfast").await.unwrap();

        let result = store
            .replace_recipe(404, &draft(vec![tag.id], vec![(flour.id, 1)]))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(store.get_recipe(404).await.unwrap().is_none());
    }
}
