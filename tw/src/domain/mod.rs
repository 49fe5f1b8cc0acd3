//! Domain types for TripWeaver
//!
//! Pipeline values flow strictly forward:
//! raw request → `NormalizedIntent` → `ContextPack` → `GroundedContext` → `TripPlan`.

mod context;
mod intent;
mod plan;

pub use context::{
    AnchorSet, ApiIntent, ChatRole, ChatTurn, ContextPack, GroundedContext, GroundingBuckets, GroundingDoc, MemoryHit,
};
pub use intent::{
    Budget, Constraints, Difficulty, Effort, GeoScope, LodgingPrefs, NormalizedIntent, Place, PlaceKind, PoiTags,
    Season, TimeWindow, Transport,
};
pub use plan::{Activity, DayPlan, LodgingSummary, MAX_TRIP_DAYS, PLAN_TYPE, PLAN_VERSION, PlanMode, TripPlan};
