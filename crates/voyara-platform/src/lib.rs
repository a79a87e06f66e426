pub mod config;
pub mod contracts;
pub mod db;
pub mod payment_rail;
pub mod pg_store;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    ApproveCommissionRequest, BookingCompletedEvent, CancelPayoutRequest, CreatePayoutRequest,
    ErrorResponse, ListCommissionsQuery, ListPayoutsQuery, RejectCommissionRequest,
};
pub use db::{SessionTimeouts, apply_schema, connect_database};
pub use payment_rail::HttpPaymentRail;
pub use pg_store::PgSettlementStore;
pub use redis_bus::{EVENT_CHANNEL_PREFIX, RedisBus, event_channel};

pub const BOOKINGS_COMPLETED_CHANNEL: &str = "bookings.completed";
