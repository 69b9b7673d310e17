pub mod dialogue;
pub mod generate;
pub mod intent;
pub mod media;
pub mod menu;
pub mod photo;
pub mod responses;
