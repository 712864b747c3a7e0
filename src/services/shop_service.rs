use sea_orm::{ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::{
    entity::{
        shops::{Entity as Shops, Model as ShopModel},
        users::{Entity as Users, Model as UserModel, UserRole},
    },
    error::{AppError, AppResult},
};

pub async fn find_user_or_throw<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<UserModel> {
    Users::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

pub async fn find_shop_or_throw<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<ShopModel> {
    Shops::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Shop"))
}

/// Passes for the shop's creator and for any admin.
pub async fn check_shop_ownership<C: ConnectionTrait>(
    conn: &C,
    shop: &ShopModel,
    user_id: Uuid,
) -> AppResult<()> {
    if shop.created_by == user_id {
        return Ok(());
    }
    let user = find_user_or_throw(conn, user_id).await?;
    if user.role == UserRole::Admin {
        return Ok(());
    }
    Err(AppError::forbidden("You can only manage your own shops"))
}
