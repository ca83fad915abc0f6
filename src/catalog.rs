use std::collections::HashSet;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::limits::*;
use crate::model::{RoomNumber, RoomType};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street_address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub number: RoomNumber,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    /// Price per night.
    pub cost: u64,
}

/// Static description of a hotel, as found in its `hotel.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub hotel_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, rename = "phoneNumber", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub rooms: Vec<RoomSpec>,
}

impl Catalog {
    /// Parse and validate a catalog document.
    pub fn from_json(json: &str) -> io::Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> io::Result<()> {
        let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);
        if self.hotel_name.trim().is_empty() {
            return Err(invalid("hotel_name must not be empty".into()));
        }
        if self.hotel_name.len() > MAX_HOTEL_NAME_LEN {
            return Err(invalid("hotel_name too long".into()));
        }
        if self.rooms.is_empty() {
            return Err(invalid("catalog lists no rooms".into()));
        }
        if self.rooms.len() > MAX_ROOMS_PER_HOTEL {
            return Err(invalid("too many rooms".into()));
        }
        let mut seen = HashSet::with_capacity(self.rooms.len());
        for room in &self.rooms {
            if !seen.insert(room.number) {
                return Err(invalid(format!("room {} listed twice", room.number)));
            }
        }
        Ok(())
    }

    pub fn room(&self, number: RoomNumber) -> Option<&RoomSpec> {
        self.rooms.iter().find(|r| r.number == number)
    }

    /// Rooms of `room_type`, in catalog order. This order breaks ties in allocation.
    pub fn rooms_of_type(&self, room_type: RoomType) -> Vec<RoomNumber> {
        self.rooms
            .iter()
            .filter(|r| r.room_type == room_type)
            .map(|r| r.number)
            .collect()
    }

    pub fn nightly_rate(&self, number: RoomNumber) -> Option<u64> {
        self.room(number).map(|r| r.cost)
    }
}
