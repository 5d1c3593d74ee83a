use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

use crate::constants::IMAGE_EXTENSIONS;

use super::schema::Id;

/// Write payload for creating or replacing a recipe. Every field is optional
/// at the wire level so that missing fields surface as field-scoped
/// validation errors instead of a body rejection.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeForm {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
    pub image: Option<String>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmountForm>>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmountForm {
    pub id: Id,
    pub amount: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AvatarForm {
    pub avatar: Option<String>,
}

/// Query string of the recipe list.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub author: Option<Id>,
    /// Comma separated tag slugs.
    pub tags: Option<String>,
    pub is_favorited: Option<u8>,
    pub is_in_shopping_cart: Option<u8>,
}

impl RecipeListQuery {
    pub fn tag_slugs(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|slug| !slug.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SubscriptionQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub recipes_limit: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct IngredientQuery {
    pub name: Option<String>,
}

/// A decoded `data:image/<ext>;base64,<payload>` upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        let (header, payload) = value
            .split_once(";base64,")
            .ok_or("Image must be a base64 encoded data URI")?;

        let extension = header
            .strip_prefix("data:image/")
            .ok_or("Image must be a base64 encoded data URI")?
            .to_ascii_lowercase();
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err("Unsupported image format");
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| "Image payload is not valid base64")?;
        if bytes.is_empty() {
            return Err("Image payload is empty");
        }

        Ok(Self { extension, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_png_data_uri() {
        let image = ImagePayload::parse("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(image.bytes, b"hello");
    }

    #[test]
    fn rejects_plain_strings_and_unknown_formats() {
        assert!(ImagePayload::parse("hello").is_err());
        assert!(ImagePayload::parse("data:image/tiff;base64,aGVsbG8=").is_err());
        assert!(ImagePayload::parse("data:image/png;base64,!!!").is_err());
    }

    #[test]
    fn tag_slugs_are_split_and_trimmed() {
        let query = RecipeListQuery {
            tags: Some("breakfast, lunch,,".into()),
            ..Default::default()
        };
        assert_eq!(query.tag_slugs(), vec!["breakfast", "lunch"]);
    }
}
