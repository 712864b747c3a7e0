//! In-app notifications.
//!
//! Services emit through [`Notifier`] after their transaction commits; a
//! background worker drains the channel into the `notifications` table, so a
//! slow or failing insert never holds up a reservation.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, sea_query::Expr,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    db::OrmConn,
    dto::notifications::{MarkedRead, NotificationList, UnreadCount},
    entity::notifications::{
        ActiveModel as NotificationActive, Column as NotificationCol, Entity as Notifications,
        NotificationKind,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Notification,
    response::ApiResponse,
    routes::params::Pagination,
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NewNotification>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NewNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a notification. Never blocks and never fails the caller.
    pub fn notify(
        &self,
        user_id: Uuid,
        title: impl Into<String>,
        body: impl Into<String>,
        kind: NotificationKind,
    ) {
        let message = NewNotification {
            user_id,
            title: title.into(),
            body: body.into(),
            kind,
        };
        if self.tx.send(message).is_err() {
            tracing::warn!(user_id = %user_id, ?kind, "notification worker is gone, dropping notification");
        }
    }
}

/// Persist queued notifications until every [`Notifier`] is dropped.
pub async fn run_notification_worker(
    orm: OrmConn,
    mut rx: mpsc::UnboundedReceiver<NewNotification>,
) {
    tracing::info!("notification worker started");
    while let Some(message) = rx.recv().await {
        let user_id = message.user_id;
        let kind = message.kind;
        if let Err(err) = persist(&orm, message).await {
            tracing::warn!(error = %err, user_id = %user_id, ?kind, "failed to store notification");
        }
    }
    tracing::info!("notification worker stopped");
}

async fn persist(orm: &OrmConn, message: NewNotification) -> AppResult<()> {
    NotificationActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(message.user_id),
        title: Set(message.title),
        body: Set(message.body),
        kind: Set(message.kind),
        is_read: Set(false),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(orm)
    .await?;
    Ok(())
}

pub async fn list_my_notifications(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<NotificationList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Notifications::find()
        .filter(NotificationCol::UserId.eq(user.user_id))
        .order_by_desc(NotificationCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Notification::from)
        .collect();

    Ok(ApiResponse::page("Ok", NotificationList { items }, page, limit, total))
}

pub async fn unread_count(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<UnreadCount>> {
    let unread = Notifications::find()
        .filter(
            Condition::all()
                .add(NotificationCol::UserId.eq(user.user_id))
                .add(NotificationCol::IsRead.eq(false)),
        )
        .count(&state.orm)
        .await?;
    Ok(ApiResponse::item("Ok", UnreadCount { unread }))
}

pub async fn mark_as_read(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Notification>> {
    let notification = Notifications::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Notification"))?;
    if notification.user_id != user.user_id {
        return Err(AppError::forbidden("You can only read your own notifications"));
    }
    if notification.is_read {
        return Ok(ApiResponse::item("Ok", notification.into()));
    }

    let mut active: NotificationActive = notification.into();
    active.is_read = Set(true);
    let notification = active.update(&state.orm).await?;
    Ok(ApiResponse::item("Notification marked as read", notification.into()))
}

pub async fn mark_all_as_read(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<MarkedRead>> {
    let result = Notifications::update_many()
        .col_expr(NotificationCol::IsRead, Expr::value(true))
        .filter(NotificationCol::UserId.eq(user.user_id))
        .filter(NotificationCol::IsRead.eq(false))
        .exec(&state.orm)
        .await?;
    Ok(ApiResponse::item(
        "Notifications marked as read",
        MarkedRead {
            updated: result.rows_affected,
        },
    ))
}
