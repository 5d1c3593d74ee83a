use std::convert::Infallible;

use serde::de::DeserializeOwned;
use warp::{Filter, Rejection, Reply};

use crate::{
    form::{IngredientQuery, RecipeListQuery, SubscriptionQuery},
    middleware::{with_identity, with_session},
    schema::{Id, RelationKind},
};

use super::{
    context::{with_context, AppContext},
    handlers,
    recovery::recover,
};

/// Base64 images travel inside the JSON body.
const BODY_LIMIT: u64 = 16 * 1024 * 1024;

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

/// Every endpoint of the service, with rejections rendered as JSON.
pub fn routes(
    ctx: AppContext,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    catalog(ctx.clone())
        .or(recipes(ctx.clone()))
        .or(users(ctx.clone()))
        .or(short_links(ctx))
        .recover(recover)
        .with(warp::log("foodgram::api"))
}

fn catalog(ctx: AppContext) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let ingredients = warp::path!("api" / "ingredients")
        .and(warp::get())
        .and(warp::query::<IngredientQuery>())
        .and(with_context(ctx.clone()))
        .and_then(handlers::list_ingredients);

    let ingredient = warp::path!("api" / "ingredients" / Id)
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handlers::get_ingredient);

    let tags = warp::path!("api" / "tags")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handlers::list_tags);

    let tag = warp::path!("api" / "tags" / Id)
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(handlers::get_tag);

    ingredients.or(ingredient).or(tags).or(tag)
}

fn relation(
    ctx: AppContext,
    kind: RelationKind,
    segment: &'static str,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let path = warp::path("api")
        .and(warp::path("recipes"))
        .and(warp::path::param::<Id>())
        .and(warp::path(segment))
        .and(warp::path::end());
    let kind = warp::any().map(move || kind);
    let session = with_session(ctx.jwt_secret.clone());

    let add = kind
        .clone()
        .and(path.clone())
        .and(warp::post())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handlers::add_relation);

    let remove = kind
        .and(path)
        .and(warp::delete())
        .and(session)
        .and(with_context(ctx))
        .and_then(handlers::remove_relation);

    add.or(remove)
}

fn recipes(ctx: AppContext) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let identity = with_identity(ctx.jwt_secret.clone());
    let session = with_session(ctx.jwt_secret.clone());

    let list = warp::path!("api" / "recipes")
        .and(warp::get())
        .and(warp::query::<RecipeListQuery>())
        .and(identity.clone())
        .and(with_context(ctx.clone()))
        .and_then(handlers::list_recipes);

    let create = warp::path!("api" / "recipes")
        .and(warp::post())
        .and(session.clone())
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(handlers::create_recipe);

    let download = warp::path!("api" / "recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handlers::download_shopping_cart);

    let detail = warp::path!("api" / "recipes" / Id)
        .and(warp::get())
        .and(identity)
        .and(with_context(ctx.clone()))
        .and_then(handlers::get_recipe);

    let replace = warp::path!("api" / "recipes" / Id)
        .and(warp::patch().or(warp::put()).unify())
        .and(session.clone())
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(handlers::replace_recipe);

    let delete = warp::path!("api" / "recipes" / Id)
        .and(warp::delete())
        .and(session)
        .and(with_context(ctx.clone()))
        .and_then(handlers::delete_recipe);

    let link = warp::path!("api" / "recipes" / Id / "get-link")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handlers::get_link);

    list.or(create)
        .or(download)
        .or(detail)
        .or(replace)
        .or(delete)
        .or(link)
        .or(relation(ctx.clone(), RelationKind::Favorite, "favorite"))
        .or(relation(ctx, RelationKind::ShoppingCart, "shopping_cart"))
}

fn users(ctx: AppContext) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let identity = with_identity(ctx.jwt_secret.clone());
    let session = with_session(ctx.jwt_secret.clone());

    let me = warp::path!("api" / "users" / "me")
        .and(warp::get())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handlers::get_me);

    let put_avatar = warp::path!("api" / "users" / "me" / "avatar")
        .and(warp::put())
        .and(session.clone())
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(handlers::put_avatar);

    let delete_avatar = warp::path!("api" / "users" / "me" / "avatar")
        .and(warp::delete())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handlers::delete_avatar);

    let subscriptions = warp::path!("api" / "users" / "subscriptions")
        .and(warp::get())
        .and(warp::query::<SubscriptionQuery>())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handlers::list_subscriptions);

    let profile = warp::path!("api" / "users" / Id)
        .and(warp::get())
        .and(identity)
        .and(with_context(ctx.clone()))
        .and_then(handlers::get_user);

    let subscribe = warp::path!("api" / "users" / Id / "subscribe")
        .and(warp::post())
        .and(warp::query::<SubscriptionQuery>())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("api" / "users" / Id / "subscribe")
        .and(warp::delete())
        .and(session)
        .and(with_context(ctx))
        .and_then(handlers::unsubscribe);

    me.or(put_avatar)
        .or(delete_avatar)
        .or(subscriptions)
        .or(profile)
        .or(subscribe)
        .or(unsubscribe)
}

fn short_links(ctx: AppContext) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("s" / String)
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(handlers::follow_short_link)
}
