pub mod fee;
pub mod schedule;

pub use fee::{compute_fee, FeeBasis, FeeCollection};
pub use schedule::{build_installment_schedule, Installment};
