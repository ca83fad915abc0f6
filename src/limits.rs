/// Max hotels loaded by one manager.
pub const MAX_HOTELS: usize = 64;

/// Max length of a hotel name (also bounds the data directory name).
pub const MAX_HOTEL_NAME_LEN: usize = 128;

pub const MAX_ROOMS_PER_HOTEL: usize = 10_000;

pub const MAX_GUESTS_PER_HOTEL: usize = 1_000_000;

/// Max length of a guest name or email.
pub const MAX_CONTACT_LEN: usize = 256;

/// Longest stay a single booking may cover.
pub const MAX_STAY_NIGHTS: i64 = 366;

/// Free intervals a calendar may fragment into.
pub const MAX_INTERVALS_PER_ROOM: usize = 10_000;

/// Largest encoded event the WAL writes or reads back.
pub const MAX_WAL_FRAME_LEN: usize = 16 * 1024 * 1024;
