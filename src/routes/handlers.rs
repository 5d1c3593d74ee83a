use serde_json::json;
use warp::{
    http::StatusCode,
    reject::{self, Rejection},
    reply::{self, Reply},
};

use crate::{
    error::Error,
    form::{AvatarForm, IngredientQuery, RecipeForm, RecipeListQuery, SubscriptionQuery},
    jwt::{Identity, SessionData},
    schema::{Id, RelationKind},
    services::{
        catalog, links, recipes, relations, shopping, users,
        views::{recipe_view, RecipeView},
    },
};

use super::context::AppContext;

type HandlerResult<T> = Result<T, Rejection>;

fn no_content() -> reply::WithStatus<&'static str> {
    reply::with_status("", StatusCode::NO_CONTENT)
}

async fn project(
    ctx: &AppContext,
    identity: &Identity,
    recipe_id: Id,
) -> Result<RecipeView, Error> {
    let aggregate = ctx
        .recipe_aggregate(recipe_id)
        .await?
        .ok_or_else(|| Error::not_found("Recipe"))?;
    recipe_view(ctx.store.as_ref(), ctx.storage.as_ref(), identity, aggregate).await
}

// Catalog

pub async fn list_ingredients(
    query: IngredientQuery,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    let rows = catalog::list_ingredients(ctx.store.as_ref(), &query)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&rows))
}

pub async fn get_ingredient(id: Id, ctx: AppContext) -> HandlerResult<impl Reply> {
    let row = catalog::get_ingredient(ctx.store.as_ref(), id)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&row))
}

pub async fn list_tags(ctx: AppContext) -> HandlerResult<impl Reply> {
    let rows = catalog::list_tags(ctx.store.as_ref())
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&rows))
}

pub async fn get_tag(id: Id, ctx: AppContext) -> HandlerResult<impl Reply> {
    let row = catalog::get_tag(ctx.store.as_ref(), id)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&row))
}

// Recipes

pub async fn list_recipes(
    query: RecipeListQuery,
    identity: Identity,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    let page = recipes::list(ctx.store.as_ref(), ctx.storage.as_ref(), &identity, &query)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&page))
}

pub async fn get_recipe(id: Id, identity: Identity, ctx: AppContext) -> HandlerResult<impl Reply> {
    let view = project(&ctx, &identity, id)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&view))
}

pub async fn create_recipe(
    session: SessionData,
    form: RecipeForm,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    let id = recipes::create(ctx.store.as_ref(), ctx.storage.as_ref(), &session, form)
        .await
        .map_err(reject::custom)?;
    ctx.recipes_changed().await;

    let view = project(&ctx, &Identity::User(session), id)
        .await
        .map_err(reject::custom)?;
    Ok(reply::with_status(reply::json(&view), StatusCode::CREATED))
}

pub async fn replace_recipe(
    id: Id,
    session: SessionData,
    form: RecipeForm,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    recipes::replace(ctx.store.as_ref(), ctx.storage.as_ref(), &session, id, form)
        .await
        .map_err(reject::custom)?;
    ctx.recipes_changed().await;

    let view = project(&ctx, &Identity::User(session), id)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&view))
}

pub async fn delete_recipe(
    id: Id,
    session: SessionData,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    recipes::delete(ctx.store.as_ref(), ctx.storage.as_ref(), &session, id)
        .await
        .map_err(reject::custom)?;
    ctx.recipes_changed().await;
    Ok(no_content())
}

pub async fn add_relation(
    kind: RelationKind,
    id: Id,
    session: SessionData,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    let view = relations::add(ctx.store.as_ref(), ctx.storage.as_ref(), &session, kind, id)
        .await
        .map_err(reject::custom)?;
    Ok(reply::with_status(reply::json(&view), StatusCode::CREATED))
}

pub async fn remove_relation(
    kind: RelationKind,
    id: Id,
    session: SessionData,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    relations::remove(ctx.store.as_ref(), &session, kind, id)
        .await
        .map_err(reject::custom)?;
    Ok(no_content())
}

pub async fn download_shopping_cart(
    session: SessionData,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    let export = shopping::export(ctx.store.as_ref(), &session)
        .await
        .map_err(reject::custom)?;

    Ok(reply::with_header(
        reply::with_header(export.body, "content-type", "text/plain; charset=utf-8"),
        "content-disposition",
        format!("attachment; filename=\"{}\"", export.filename),
    ))
}

pub async fn get_link(id: Id, ctx: AppContext) -> HandlerResult<impl Reply> {
    let link = links::get_or_create(ctx.store.as_ref(), &ctx.public_url, id)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&json!({ "short-link": link.short_url })))
}

pub async fn follow_short_link(code: String, ctx: AppContext) -> HandlerResult<impl Reply> {
    let url = ctx
        .resolve_short_link(&code)
        .await
        .map_err(reject::custom)?;
    Ok(reply::with_header(
        reply::with_status(warp::reply(), StatusCode::FOUND),
        "location",
        url,
    ))
}

// Users

pub async fn get_user(id: Id, identity: Identity, ctx: AppContext) -> HandlerResult<impl Reply> {
    let view = users::profile(ctx.store.as_ref(), ctx.storage.as_ref(), &identity, id)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&view))
}

pub async fn get_me(session: SessionData, ctx: AppContext) -> HandlerResult<impl Reply> {
    let view = users::me(ctx.store.as_ref(), ctx.storage.as_ref(), &session)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&view))
}

pub async fn put_avatar(
    session: SessionData,
    form: AvatarForm,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    let url = users::set_avatar(ctx.store.as_ref(), ctx.storage.as_ref(), &session, form)
        .await
        .map_err(reject::custom)?;
    ctx.recipes_changed().await;
    Ok(reply::json(&json!({ "avatar": url })))
}

pub async fn delete_avatar(session: SessionData, ctx: AppContext) -> HandlerResult<impl Reply> {
    users::clear_avatar(ctx.store.as_ref(), ctx.storage.as_ref(), &session)
        .await
        .map_err(reject::custom)?;
    ctx.recipes_changed().await;
    Ok(no_content())
}

pub async fn subscribe(
    id: Id,
    query: SubscriptionQuery,
    session: SessionData,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    let view = relations::subscribe(
        ctx.store.as_ref(),
        ctx.storage.as_ref(),
        &session,
        id,
        query.recipes_limit,
    )
    .await
    .map_err(reject::custom)?;
    Ok(reply::with_status(reply::json(&view), StatusCode::CREATED))
}

pub async fn unsubscribe(
    id: Id,
    session: SessionData,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    relations::unsubscribe(ctx.store.as_ref(), &session, id)
        .await
        .map_err(reject::custom)?;
    Ok(no_content())
}

pub async fn list_subscriptions(
    query: SubscriptionQuery,
    session: SessionData,
    ctx: AppContext,
) -> HandlerResult<impl Reply> {
    let page = relations::subscriptions(ctx.store.as_ref(), ctx.storage.as_ref(), &session, &query)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&page))
}
