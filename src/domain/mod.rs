// Domain layer: models and ports. Adapters for Eventbrite and Postgres live in `core`.

pub mod model;
pub mod ports;
