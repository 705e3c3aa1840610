use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use num_bigint::BigInt;

/// Address of the accumulator.
pub const ACCUMULATOR: &str = "0";

/// Text shown for a cell that exists but has never been assigned.
pub const UNINITIALIZED: &str = "?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Uninitialized,
    Value(BigInt),
}

impl Cell {
    pub fn value(&self) -> Option<&BigInt> {
        match self {
            Cell::Uninitialized => None,
            Cell::Value(v) => Some(v),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Uninitialized => f.write_str(UNINITIALIZED),
            Cell::Value(v) => write!(f, "{v}"),
        }
    }
}

/// Key under which `addr` is stored: numeric addresses lose their leading
/// zeros so `7`, `07` and `*p` (with p = 7) name the same cell.
pub fn canonical_address(addr: &str) -> Cow<'_, str> {
    let numeric = !addr.is_empty() && addr.bytes().all(|b| b.is_ascii_digit());
    if !numeric || !addr.starts_with('0') || addr.len() == 1 {
        return Cow::Borrowed(addr);
    }
    match addr.trim_start_matches('0') {
        "" => Cow::Borrowed(ACCUMULATOR),
        digits => Cow::Owned(digits.to_string()),
    }
}

/// Unbounded register file keyed by address text. Cell "0" is the accumulator
/// and always exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    cells: HashMap<String, Cell>,
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        let mut cells = HashMap::new();
        cells.insert(ACCUMULATOR.to_string(), Cell::Uninitialized);
        Memory { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, addr: &str) -> Option<&Cell> {
        self.cells.get(canonical_address(addr).as_ref())
    }

    /// Value of an assigned cell; `None` if absent or uninitialized.
    pub fn read(&self, addr: &str) -> Option<&BigInt> {
        self.get(addr).and_then(Cell::value)
    }

    pub fn write(&mut self, addr: &str, cell: Cell) {
        let key = canonical_address(addr);
        match self.cells.get_mut(key.as_ref()) {
            Some(slot) => *slot = cell,
            None => {
                self.cells.insert(key.into_owned(), cell);
            }
        }
    }

    pub fn accumulator(&self) -> &Cell {
        self.cells.get(ACCUMULATOR).unwrap_or(&Cell::Uninitialized)
    }

    pub fn set_accumulator(&mut self, value: BigInt) {
        self.write(ACCUMULATOR, Cell::Value(value));
    }

    /// All cells as (address, value) text pairs: numeric addresses first in
    /// numeric order, then named cells alphabetically.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .cells
            .iter()
            .map(|(addr, cell)| (addr.clone(), cell.to_string()))
            .collect();
        out.sort_by(|(a, _), (b, _)| compare_addresses(a, b));
        out
    }
}

/// Display order of cells: numeric addresses by value, then names by text.
pub fn compare_addresses(a: &str, b: &str) -> Ordering {
    address_key(a).cmp(&address_key(b))
}

fn address_key(addr: &str) -> (u8, usize, &str, &str) {
    let numeric = !addr.is_empty() && addr.bytes().all(|b| b.is_ascii_digit());
    if numeric {
        let digits = addr.trim_start_matches('0');
        (0, digits.len(), digits, addr)
    } else {
        (1, 0, addr, addr)
    }
}
