use std::{
    fs::{
        self,
        File,
    },
    io::{
        BufReader,
        BufWriter,
        Read,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
};

use log::{
    info,
    warn,
};
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Serialize,
};

use crate::core::Result;

const APP_NAME: &str = "yomine";
const STUDY_DIR: &str = "study";

pub fn get_app_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let app_dir = data_dir.join(APP_NAME);
        let _ = fs::create_dir_all(&app_dir);
        app_dir
    } else {
        PathBuf::from(".")
    }
}

pub fn get_data_file_path(filename: &str) -> PathBuf {
    get_app_data_dir().join(filename)
}

/// Where deck files live, one `<name>.deck` per deck.
pub fn get_deck_file_path(deck_name: &str) -> PathBuf {
    let dir = get_app_data_dir().join(STUDY_DIR);
    let _ = fs::create_dir_all(&dir);
    dir.join(deck_file_name(deck_name))
}

fn deck_file_name(deck_name: &str) -> String {
    let safe: String = deck_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}.deck", safe)
}

pub fn save_json<T: Serialize>(data: &T, filename: &str) -> Result<()> {
    save_json_to(data, &get_data_file_path(filename))
}

pub fn save_json_to<T: Serialize>(data: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json)?;
    info!("Data saved to: {}", path.display());
    Ok(())
}

pub fn load_json<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> Result<T> {
    load_json_from(&get_data_file_path(filename))
}

pub fn load_json_from<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let json = fs::read_to_string(path)?;
    let data: T = serde_json::from_str(&json)?;
    info!("Data loaded from: {}", path.display());
    Ok(data)
}

pub fn load_json_or_default<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> T {
    match load_json::<T>(filename) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to load {}: {}. Using defaults.", filename, e);
            T::default()
        }
    }
}

pub fn encode_to_writer<T: Serialize, W: Write>(data: &T, writer: &mut W) -> Result<usize> {
    Ok(bincode::serde::encode_into_std_write(data, writer, bincode::config::standard())?)
}

pub fn decode_from_reader<T: DeserializeOwned, R: Read>(reader: &mut R) -> Result<T> {
    Ok(bincode::serde::decode_from_std_read(reader, bincode::config::standard())?)
}

pub fn save_binary_to<T: Serialize>(data: &T, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let written = encode_to_writer(data, &mut writer)?;
    writer.flush()?;
    info!("Saved {} bytes to: {}", written, path.display());
    Ok(())
}

pub fn load_binary_from<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut reader = BufReader::new(File::open(path)?);
    let data = decode_from_reader(&mut reader)?;
    info!("Data loaded from: {}", path.display());
    Ok(data)
}
