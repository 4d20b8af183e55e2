pub mod actions;
pub mod admin;
pub mod health;
pub mod webhooks;

use crate::cli::AppEnv;
use crate::db::DbPool;
use crate::ports::CheckoutSessionCreator;
use crate::ports::CopyRenderer;
use crate::ports::MirrorSink;
use crate::ports::Notifier;
use crate::ports::SlotProvider;
use crate::rate_limit;
use crate::settings::Settings;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct AppState {
    pub pool: DbPool,
    pub settings: Arc<RwLock<Settings>>,
    pub app_env: AppEnv,
    pub whatsapp_app_secret: String,
    pub whatsapp_verify_token: String,
    pub stripe_webhook_secret: String,
    pub admin_api_key: String,
    pub notifier: Arc<dyn Notifier>,
    pub renderer: Arc<dyn CopyRenderer>,
    pub checkout_creator: Arc<dyn CheckoutSessionCreator>,
    pub mirror_sink: Arc<dyn MirrorSink>,
    pub slot_provider: Arc<dyn SlotProvider>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/webhooks/whatsapp",
            get(webhooks::verify_whatsapp).post(webhooks::inbound_whatsapp),
        )
        .route("/webhooks/stripe", post(webhooks::inbound_stripe))
        .route("/admin/leads/:id", get(admin::snapshot))
        .route("/admin/leads/:id/approve", post(admin::approve))
        .route("/admin/leads/:id/reject", post(admin::reject))
        .route("/admin/leads/:id/slots", post(admin::set_slots))
        .route("/admin/leads/:id/book", post(admin::book))
        .route("/admin/leads/:id/send-booking-link", post(admin::send_booking_link))
        .route("/a/:token", get(actions::confirm).post(actions::execute))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::limit))
        .with_state(state)
}
