//! Ready-made models on top of the generic engine: each builder turns its
//! instance data into a master problem, a pricer and a way to read the
//! answer back.

pub mod crew_pairing;
pub mod crew_rostering;
pub mod cutting_stock;

pub use crew_pairing::{CrewPairing, Flight};
pub use crew_rostering::{CrewMember, CrewRostering, Pairing, RosterRules};
pub use cutting_stock::{CuttingStock, Order};
