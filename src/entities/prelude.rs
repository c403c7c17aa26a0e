pub use super::media_objects::Entity as MediaObjects;
