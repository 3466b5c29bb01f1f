pub use super::uploads::Entity as Uploads;
