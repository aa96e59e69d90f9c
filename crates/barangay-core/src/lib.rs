pub mod clock;
pub mod derive;
pub mod geo;
pub mod model;
pub mod policy;
