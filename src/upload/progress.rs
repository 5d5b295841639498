//! Progress mapping
//!
//! Displayed progress is split into three bands: 0-20 while the upload target
//! is requested, 20-95 while bytes are in flight, and 100 once the object is
//! linked. A transfer alone never shows more than 95.

/// Progress once a usable upload target was issued
pub const TARGET_ACQUIRED_PROGRESS: u8 = 20;

/// Highest progress a running transfer can report
pub const TRANSFER_COMPLETE_PROGRESS: u8 = 95;

/// Progress of a linked, successful item
pub const COMPLETE_PROGRESS: u8 = 100;

/// Map transferred bytes to a displayed percentage in
/// [`TARGET_ACQUIRED_PROGRESS`, `TRANSFER_COMPLETE_PROGRESS`].
///
/// An empty body counts as fully transferred.
pub fn transfer_percent(bytes_sent: u64, total_bytes: u64) -> u8 {
    if total_bytes == 0 {
        return TRANSFER_COMPLETE_PROGRESS;
    }

    let band = u128::from(TRANSFER_COMPLETE_PROGRESS - TARGET_ACQUIRED_PROGRESS);
    let sent = u128::from(bytes_sent.min(total_bytes));
    let scaled = sent * band / u128::from(total_bytes);

    // scaled <= band, so this fits in u8
    TARGET_ACQUIRED_PROGRESS + scaled as u8
}
