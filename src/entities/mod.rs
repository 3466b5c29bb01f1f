pub mod prelude;

pub mod uploads;
