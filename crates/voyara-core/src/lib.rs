pub mod clock;
pub mod error;
pub mod events;
pub mod models;
pub mod money;
pub mod rail;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PaymentRailError, SettlementError, SettlementResult};
pub use events::{DomainEvent, DomainEventKind};
pub use models::{
    Commission, CommissionRule, CommissionStatus, CommissionTotals, Partner, PartnerBalance,
    PartnerStatus, PartnerTier, Payout, PayoutFrequency, PayoutStatus, PayoutTotals,
};
pub use rail::{DisbursementReceipt, DisbursementRequest, PaymentRail};
pub use storage::{
    CommissionDecision, CommissionFilter, CommissionStore, EventEnvelope, EventPublisher,
    EventSink, EventStore, NewCommission, NewPayout, PartnerStore, PayoutChange, PayoutFilter,
    PayoutStore, Recorded, SettlementStore, list_limit,
};
