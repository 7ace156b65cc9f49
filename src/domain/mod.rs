// Domain layer: models and ports shared by adapters, core and app.

pub mod model;
pub mod ports;
