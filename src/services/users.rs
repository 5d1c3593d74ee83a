use crate::{
    constants::AVATAR_IMAGE_FOLDER,
    error::{Error, ValidationErrors},
    form::{AvatarForm, ImagePayload},
    jwt::{Identity, SessionData},
    permissions::ActionType,
    schema::Id,
    storage::ObjectStorage,
    store::RecipeStore,
};

use super::{
    recipes::discard_image,
    views::{user_view, UserView},
};

pub async fn profile(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    identity: &Identity,
    user_id: Id,
) -> Result<UserView, Error> {
    let user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| Error::not_found("User"))?;
    user_view(store, storage, identity, &user).await
}

pub async fn me(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
) -> Result<UserView, Error> {
    profile(
        store,
        storage,
        &Identity::User(session.clone()),
        session.user_id,
    )
    .await
}

/// Stores the uploaded avatar and returns its public URL.
pub async fn set_avatar(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
    form: AvatarForm,
) -> Result<String, Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;

    let image = match form.avatar.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => ImagePayload::parse(value)
            .map_err(|message| Error::Validation(ValidationErrors::single("avatar", message)))?,
        _ => {
            return Err(Error::Validation(ValidationErrors::single(
                "avatar",
                "This field is required.",
            )))
        }
    };

    let previous = store
        .get_user(session.user_id)
        .await?
        .ok_or_else(|| Error::not_found("User"))?
        .avatar;

    let reference = storage.put(AVATAR_IMAGE_FOLDER, image).await?;
    if let Err(e) = store.set_user_avatar(session.user_id, Some(&reference)).await {
        discard_image(storage, &reference).await;
        return Err(e);
    }
    if let Some(previous) = previous {
        discard_image(storage, &previous).await;
    }

    Ok(storage.url(&reference))
}

pub async fn clear_avatar(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;

    let user = store
        .get_user(session.user_id)
        .await?
        .ok_or_else(|| Error::not_found("User"))?;

    store.set_user_avatar(session.user_id, None).await?;
    if let Some(avatar) = user.avatar {
        discard_image(storage, &avatar).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::schema::UserRole;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;

    /// Accepts uploads but refuses to delete anything.
    struct StickyStorage(MemoryStorage);

    #[async_trait]
    impl ObjectStorage for StickyStorage {
        async fn put(&self, folder: &str, image: ImagePayload) -> Result<String, Error> {
            self.0.put(folder, image).await
        }

        async fn delete(&self, _reference: &str) -> Result<(), Error> {
            Err(Error::Storage("read-only volume".to_owned()))
        }

        fn url(&self, reference: &str) -> String {
            self.0.url(reference)
        }
    }

    #[tokio::test]
    async fn avatar_is_replaced_and_cleared() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let user = store.add_user("alice", UserRole::User).await;
        let session = SessionData {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            is_admin: false,
        };
        let form = AvatarForm {
            avatar: Some("data:image/png;base64,aGVsbG8=".into()),
        };

        let first = set_avatar(&store, &storage, &session, form.clone())
            .await
            .unwrap();
        let first_ref = store.get_user(user.id).await.unwrap().unwrap().avatar.unwrap();
        assert_eq!(first, format!("/media/{first_ref}"));

        set_avatar(&store, &storage, &session, form).await.unwrap();
        assert!(!storage.contains(&first_ref).await);

        clear_avatar(&store, &storage, &session).await.unwrap();
        let view = me(&store, &storage, &session).await.unwrap();
        assert_eq!(view.avatar, None);
        assert!(!view.is_subscribed);

        assert!(matches!(
            set_avatar(&store, &storage, &session, AvatarForm::default()).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn failed_cleanup_does_not_undo_a_saved_avatar() {
        let store = MemoryStore::new();
        let storage = StickyStorage(MemoryStorage::new());
        let user = store.add_user("bob", UserRole::User).await;
        let session = SessionData {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            is_admin: false,
        };
        let form = AvatarForm {
            avatar: Some("data:image/png;base64,aGVsbG8=".into()),
        };

        set_avatar(&store, &storage, &session, form.clone())
            .await
            .unwrap();
        let first = store.get_user(user.id).await.unwrap().unwrap().avatar;

        let url = set_avatar(&store, &storage, &session, form).await.unwrap();
        let second = store.get_user(user.id).await.unwrap().unwrap().avatar.unwrap();
        assert_ne!(first.as_deref(), Some(second.as_str()));
        assert_eq!(url, storage.url(&second));

        clear_avatar(&store, &storage, &session).await.unwrap();
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().avatar, None);
    }
}
