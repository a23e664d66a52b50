pub mod data;

pub use data::{
    DeckSettings,
    SETTINGS_FILE,
};
