use rand::Rng;
use serde::Serialize;

use crate::{
    constants::{SHORT_CODE_ALPHABET, SHORT_CODE_ATTEMPTS, SHORT_CODE_LENGTH},
    error::Error,
    schema::{Id, ShortLink},
    store::RecipeStore,
};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeLink {
    pub short_code: String,
    pub canonical_url: String,
    pub short_url: String,
}

impl RecipeLink {
    fn new(public_url: &str, link: ShortLink) -> Self {
        Self {
            canonical_url: canonical_url(public_url, link.recipe_id),
            short_url: short_url(public_url, &link.short_code),
            short_code: link.short_code,
        }
    }
}

pub fn canonical_url(public_url: &str, recipe_id: Id) -> String {
    format!("{}/recipes/{recipe_id}", public_url.trim_end_matches('/'))
}

pub fn short_url(public_url: &str, short_code: &str) -> String {
    format!("{}/s/{short_code}", public_url.trim_end_matches('/'))
}

pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SHORT_CODE_LENGTH)
        .map(|_| char::from(SHORT_CODE_ALPHABET[rng.gen_range(0..SHORT_CODE_ALPHABET.len())]))
        .collect()
}

pub async fn get_or_create(
    store: &dyn RecipeStore,
    public_url: &str,
    recipe_id: Id,
) -> Result<RecipeLink, Error> {
    get_or_create_with(store, public_url, recipe_id, || {
        random_code(&mut rand::thread_rng())
    })
    .await
}

/// Returns the recipe's link, creating one with codes from `next_code` if it
/// has none. Gives up after `SHORT_CODE_ATTEMPTS` collisions.
pub async fn get_or_create_with<F>(
    store: &dyn RecipeStore,
    public_url: &str,
    recipe_id: Id,
    mut next_code: F,
) -> Result<RecipeLink, Error>
where
    F: FnMut() -> String + Send,
{
    if store.get_recipe(recipe_id).await?.is_none() {
        return Err(Error::not_found("Recipe"));
    }
    if let Some(link) = store.find_recipe_short_link(recipe_id).await? {
        return Ok(RecipeLink::new(public_url, link));
    }

    for attempt in 1..=SHORT_CODE_ATTEMPTS {
        let short_code = next_code();
        if store.insert_short_link(&short_code, recipe_id).await? {
            log::info!("> Created short link {short_code} for recipe {recipe_id}");
            return Ok(RecipeLink::new(
                public_url,
                ShortLink {
                    short_code,
                    recipe_id,
                },
            ));
        }

        // Either the code is taken or another request linked this recipe first.
        if let Some(link) = store.find_recipe_short_link(recipe_id).await? {
            return Ok(RecipeLink::new(public_url, link));
        }
        log::warn!("> Short code collision on {short_code} (attempt {attempt})");
    }

    log::error!("> Ran out of short codes for recipe {recipe_id}");
    Err(Error::ResourceExhausted(
        "Could not allocate a unique short link".to_owned(),
    ))
}

pub async fn lookup(
    store: &dyn RecipeStore,
    public_url: &str,
    short_code: &str,
) -> Result<Option<String>, Error> {
    Ok(store
        .find_short_link(short_code)
        .await?
        .map(|link| canonical_url(public_url, link.recipe_id)))
}

/// Canonical recipe URL behind a short code.
pub async fn resolve(
    store: &dyn RecipeStore,
    public_url: &str,
    short_code: &str,
) -> Result<String, Error> {
    lookup(store, public_url, short_code)
        .await?
        .ok_or_else(|| Error::not_found("Short link"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::schema::{RecipeDraft, UserRole};

    const PUBLIC_URL: &str = "https://food.example/";

    async fn seeded(count: usize) -> (MemoryStore, Vec<Id>) {
        let store = MemoryStore::new();
        let author = store.add_user("alice", UserRole::User).await;
        let flour = store.add_ingredient("flour", "g").await.unwrap();
        let tag = store.add_tag("Bakery", "bakery").await.unwrap();

        let mut ids = Vec::new();
        for n in 0..count {
            ids.push(
                store
                    .insert_recipe(
                        author.id,
                        &RecipeDraft {
                            name: format!("Bread {n}"),
                            text: "Bake".into(),
                            cooking_time: 30,
                            image: Some("recipes/bread.png".into()),
                            tags: vec![tag.id],
                            ingredients: vec![(flour.id, 100)],
                        },
                    )
                    .await
                    .unwrap(),
            );
        }
        (store, ids)
    }

    #[test]
    fn random_codes_use_the_alphabet() {
        let code = random_code(&mut rand::thread_rng());
        assert_eq!(code.len(), SHORT_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn link_is_stable_and_resolves_to_the_recipe() {
        let (store, ids) = seeded(1).await;

        let first = get_or_create(&store, PUBLIC_URL, ids[0]).await.unwrap();
        let second = get_or_create(&store, PUBLIC_URL, ids[0]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.short_url,
            format!("https://food.example/s/{}", first.short_code)
        );

        let url = resolve(&store, PUBLIC_URL, &first.short_code).await.unwrap();
        assert_eq!(url, format!("https://food.example/recipes/{}", ids[0]));
        assert!(matches!(
            resolve(&store, PUBLIC_URL, "nope00").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn collisions_are_retried() {
        let (store, ids) = seeded(2).await;
        get_or_create_with(&store, PUBLIC_URL, ids[0], || "aaaaaa".to_owned())
            .await
            .unwrap();

        let mut codes = vec!["bbbbbb", "aaaaaa", "aaaaaa"];
        let link = get_or_create_with(&store, PUBLIC_URL, ids[1], || {
            codes.pop().unwrap_or("cccccc").to_owned()
        })
        .await
        .unwrap();
        assert_eq!(link.short_code, "bbbbbb");
    }

    #[tokio::test]
    async fn exhausted_attempts_fail() {
        let (store, ids) = seeded(2).await;
        get_or_create_with(&store, PUBLIC_URL, ids[0], || "aaaaaa".to_owned())
            .await
            .unwrap();

        let mut calls = 0;
        let result = get_or_create_with(&store, PUBLIC_URL, ids[1], || {
            calls += 1;
            "aaaaaa".to_owned()
        })
        .await;
        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
        assert_eq!(calls, SHORT_CODE_ATTEMPTS);
    }

    #[tokio::test]
    async fn missing_recipe_has_no_link() {
        let (store, _) = seeded(0).await;
        assert!(matches!(
            get_or_create(&store, PUBLIC_URL, 42).await,
            Err(Error::NotFound(_))
        ));
    }
}
