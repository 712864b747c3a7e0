use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use surplus_market_api::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, run_migrations},
    entity::{
        Baskets, Shops, Users,
        baskets::{ActiveModel as BasketActive, BasketStatus, Column as BasketCol},
        shops::{ActiveModel as ShopActive, Column as ShopCol, ShopStatus},
        users::{ActiveModel as UserActive, Column as UserCol, UserRole},
    },
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "Platform Admin", "+22200000001", UserRole::Admin).await?;
    let merchant_id =
        ensure_user(&orm, "Boulangerie Owner", "+22200000002", UserRole::Merchant).await?;
    let customer_id =
        ensure_user(&orm, "Demo Customer", "+22200000003", UserRole::Customer).await?;
    let shop_id = ensure_shop(&orm, "Boulangerie du Port", merchant_id).await?;
    seed_baskets(&orm, shop_id, &config.default_currency).await?;

    println!(
        "Seed completed. Admin: {admin_id}, Merchant: {merchant_id}, Customer: {customer_id}, Shop: {shop_id}"
    );
    Ok(())
}

async fn ensure_user(
    orm: &OrmConn,
    full_name: &str,
    phone: &str,
    role: UserRole,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find().filter(UserCol::Phone.eq(phone)).one(orm).await? {
        return Ok(existing.id);
    }

    let now = Utc::now().fixed_offset();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        full_name: Set(full_name.to_string()),
        phone: Set(phone.to_string()),
        email: Set(None),
        role: Set(role),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(orm)
    .await?;

    println!("Ensured user {phone} (role={role})");
    Ok(user.id)
}

async fn ensure_shop(orm: &OrmConn, name: &str, owner: Uuid) -> anyhow::Result<Uuid> {
    if let Some(existing) = Shops::find().filter(ShopCol::Name.eq(name)).one(orm).await? {
        return Ok(existing.id);
    }

    let now = Utc::now().fixed_offset();
    let shop = ShopActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        city: Set(Some("Nouakchott".into())),
        status: Set(ShopStatus::Active),
        created_by: Set(owner),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(orm)
    .await?;
    Ok(shop.id)
}

async fn seed_baskets(orm: &OrmConn, shop_id: Uuid, currency: &str) -> anyhow::Result<()> {
    let baskets = [
        ("Bread surprise", 1500, 600, 8, 2),
        ("Pastry box", 2500, 1000, 5, 3),
        ("End-of-day sandwiches", 1800, 700, 10, 4),
    ];

    for (title, original, discount, quantity, start_in_hours) in baskets {
        let exists = Baskets::find()
            .filter(BasketCol::ShopId.eq(shop_id))
            .filter(BasketCol::Title.eq(title))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        let now = Utc::now().fixed_offset();
        let pickup_start = now + Duration::hours(start_in_hours);
        BasketActive {
            id: Set(Uuid::new_v4()),
            shop_id: Set(shop_id),
            title: Set(title.to_string()),
            description: Set(None),
            price_original: Set(original),
            price_discount: Set(discount),
            currency: Set(currency.to_string()),
            quantity_total: Set(quantity),
            quantity_left: Set(quantity),
            pickup_start: Set(pickup_start),
            pickup_end: Set(pickup_start + Duration::hours(2)),
            status: Set(BasketStatus::Published),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded baskets");
    Ok(())
}
