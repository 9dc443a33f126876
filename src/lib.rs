pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fees;
pub mod grants;
pub mod ledger;
pub mod overdue;
pub mod payments;
pub mod serialization;
pub mod state;
pub mod store;
pub mod types;

// re-export key types
pub use config::{DiscountPolicy, LedgerConfig, PaymentPolicy, StatusPolicy, ZeroObligationStatus};
pub use decimal::Money;
pub use engine::{PaymentReceipt, TuitionLedger};
pub use errors::{ErrorKind, LedgerError, Result};
pub use events::{Event, EventStore};
pub use fees::{Department, FeeItem, FeeResolution, FeeResolver, ScopeFilters, ScopeMatcher, Student, StudentScope};
pub use grants::{Grant, GrantAssignment, GrantCalculator};
pub use ledger::{CarryBack, LedgerAggregator, LedgerSnapshot, StatusRules, YearPosition};
pub use overdue::{BulkOverdueFailure, BulkOverdueReport, OverdueFilter, OverdueManager, OverdueState};
pub use payments::{
    Allocation, DebtBucket, PaymentAllocator, PaymentEdit, PaymentRecord, PaymentRequest,
    PaymentValidator,
};
pub use serialization::LedgerStatement;
pub use state::{LedgerKey, StudentFeeRecord};
pub use store::{InMemoryStore, LedgerRows, LedgerStore};
pub use types::{
    AssignmentScope, Classification, GrantStatus, GrantType, PaymentMethod, PaymentStatus,
    SchoolYear,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
