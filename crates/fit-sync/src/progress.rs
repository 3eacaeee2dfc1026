/// How one item of a transfer ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Transferred,
    /// The remote already had it; nothing was sent.
    AlreadyPresent,
    Failed,
}

/// Receives progress events from a transfer. Every method has a no-op
/// default.
pub trait TransferProgress: Send {
    /// Called once, before the first item, with the bytes to move.
    fn start(&mut self, _total_bytes: u64) {}
    fn new_item(&mut self, _path: &str, _size: u64) {}
    /// `done` bytes of the current item have moved.
    fn advance(&mut self, _done: u64) {}
    fn item_finished(&mut self, _outcome: ItemOutcome) {}
    fn done(&mut self) {}
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuietProgress;

impl TransferProgress for QuietProgress {}
