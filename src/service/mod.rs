pub mod group;
pub mod pricing;
pub mod ratio;

pub use group::GroupResolver;
pub use pricing::PricingService;
pub use ratio::{EffectiveRatio, RatioEngine};
