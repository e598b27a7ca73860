//! Data-ready hand-off between the load-cell interrupt and the main tick.
//!
//! The ADS1232 pulls DOUT low when a conversion is available.  The
//! falling-edge ISR only raises a flag; the main tick clocks the
//! conversion out and latches it.  The flag and the latched raw value are
//! the only state shared with interrupt context, and every access goes
//! through a critical section.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

#[derive(Debug, Clone, Copy, Default)]
struct Shared {
    ready: bool,
    raw: i32,
}

/// Interrupt-shared data-ready flag plus the last latched conversion.
pub struct DataReady {
    inner: Mutex<CriticalSectionRawMutex, Cell<Shared>>,
}

impl DataReady {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(Shared { ready: false, raw: 0 })),
        }
    }

    /// Raise the flag.  Safe to call from the GPIO ISR.
    pub fn signal(&self) {
        self.inner.lock(|cell| {
            let mut s = cell.get();
            s.ready = true;
            cell.set(s);
        });
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock(|cell| cell.get().ready)
    }

    /// Store a consumed conversion and clear the flag atomically.
    pub fn latch(&self, raw: i32) {
        self.inner.lock(|cell| cell.set(Shared { ready: false, raw }));
    }

    /// Drop a pending flag without latching anything.
    pub fn clear(&self) {
        self.inner.lock(|cell| {
            let mut s = cell.get();
            s.ready = false;
            cell.set(s);
        });
    }

    /// Last latched conversion.
    pub fn last_raw(&self) -> i32 {
        self.inner.lock(|cell| cell.get().raw)
    }
}

impl Default for DataReady {
    fn default() -> Self {
        Self::new()
    }
}

/// The board's load-cell data-ready line.
pub static SCALE_DATA_READY: DataReady = DataReady::new();

/// GPIO ISR entry for the ADS1232 DOUT falling edge.
pub fn on_scale_data_ready() {
    SCALE_DATA_READY.signal();
}
