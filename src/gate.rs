/// Parks work until the store's first authoritative load, then releases it
/// exactly once. Opening is single-resolution: later items pass straight
/// through and the queue is never refilled.
#[derive(Debug)]
pub struct ReadyGate<T> {
    open: bool,
    parked: Vec<T>,
}

impl<T> Default for ReadyGate<T> {
    fn default() -> Self {
        Self {
            open: false,
            parked: Vec::new(),
        }
    }
}

impl<T> ReadyGate<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    /// Hands `item` back when the gate is open, parks it otherwise.
    pub fn admit(&mut self, item: T) -> Option<T> {
        if self.open {
            Some(item)
        } else {
            self.parked.push(item);
            None
        }
    }

    /// Opens the gate and returns what was parked, in arrival order. Empty on
    /// every call after the first.
    pub fn open(&mut self) -> Vec<T> {
        self.open = true;
        std::mem::take(&mut self.parked)
    }

    /// Closes the gate again for a newly opened store and hands back whatever
    /// was still parked.
    pub fn reset(&mut self) -> Vec<T> {
        self.open = false;
        std::mem::take(&mut self.parked)
    }
}
