use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Unique identifier for an intersection ('A', 'B', ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntersectionId(pub char);

impl fmt::Display for IntersectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Travel direction through an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "NS")]
    NorthSouth,
    #[serde(rename = "SN")]
    SouthNorth,
    #[serde(rename = "EW")]
    EastWest,
    #[serde(rename = "WE")]
    WestEast,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::NorthSouth,
        Direction::SouthNorth,
        Direction::EastWest,
        Direction::WestEast,
    ];

    /// Position of this direction in per-direction arrays.
    pub fn index(self) -> usize {
        match self {
            Direction::NorthSouth => 0,
            Direction::SouthNorth => 1,
            Direction::EastWest => 2,
            Direction::WestEast => 3,
        }
    }

    /// EW and WE are the turning movements; they get the slower speed band.
    pub fn is_turning(self) -> bool {
        matches!(self, Direction::EastWest | Direction::WestEast)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::NorthSouth => "NS",
            Direction::SouthNorth => "SN",
            Direction::EastWest => "EW",
            Direction::WestEast => "WE",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected numeric direction code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectionError {
    InvalidCode(u8),
}

impl fmt::Display for DirectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DirectionError::InvalidCode(code) => {
                write!(f, "invalid direction code {} (expected 1-4)", code)
            }
        }
    }
}

impl std::error::Error for DirectionError {}

impl TryFrom<u8> for Direction {
    type Error = DirectionError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Direction::NorthSouth),
            2 => Ok(Direction::SouthNorth),
            3 => Ok(Direction::EastWest),
            4 => Ok(Direction::WestEast),
            other => Err(DirectionError::InvalidCode(other)),
        }
    }
}

/// The two right-of-way configurations an intersection alternates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// NS and SN open, EW and WE closed.
    NorthSouth,
    /// EW and WE open, NS and SN closed.
    EastWest,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::NorthSouth => Phase::EastWest,
            Phase::EastWest => Phase::NorthSouth,
        }
    }

    pub fn open_directions(self) -> [Direction; 2] {
        match self {
            Phase::NorthSouth => [Direction::NorthSouth, Direction::SouthNorth],
            Phase::EastWest => [Direction::EastWest, Direction::WestEast],
        }
    }

    pub fn allows(self, direction: Direction) -> bool {
        self.open_directions().contains(&direction)
    }

    /// Even arena positions start north-south, odd ones east-west.
    pub fn initial_for(position: usize) -> Phase {
        if position % 2 == 0 {
            Phase::NorthSouth
        } else {
            Phase::EastWest
        }
    }
}

/// Point-in-time view of the four signals of one intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub ns: bool,
    pub sn: bool,
    pub ew: bool,
    pub we: bool,
}

impl SignalSnapshot {
    pub fn is_open(&self, direction: Direction) -> bool {
        match direction {
            Direction::NorthSouth => self.ns,
            Direction::SouthNorth => self.sn,
            Direction::EastWest => self.ew,
            Direction::WestEast => self.we,
        }
    }

    /// The phase this snapshot matches exactly, if any.
    pub fn phase(&self) -> Option<Phase> {
        match (self.ns, self.sn, self.ew, self.we) {
            (true, true, false, false) => Some(Phase::NorthSouth),
            (false, false, true, true) => Some(Phase::EastWest),
            _ => None,
        }
    }
}

impl fmt::Display for SignalSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = |open: bool| if open { "open" } else { "closed" };
        write!(
            f,
            "NS: {}, SN: {}, EW: {}, WE: {}",
            label(self.ns),
            label(self.sn),
            label(self.ew),
            label(self.we)
        )
    }
}

/// Stable position of an intersection inside a `Network` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntersectionIndex(pub usize);

/// A traffic intersection (node) with one guarded signal per direction.
#[derive(Debug)]
pub struct Intersection {
    /// Unique identifier for the intersection.
    pub id: IntersectionId,
    /// One flag per direction, each behind its own lock.
    signals: [Mutex<bool>; 4],
    /// Successor per direction, `None` where the direction leaves the network.
    next: [Option<IntersectionIndex>; 4],
}

impl Intersection {
    /// Creates an intersection whose signals match `phase` and with no outgoing edges.
    pub fn new(id: IntersectionId, phase: Phase) -> Self {
        Self {
            id,
            signals: Direction::ALL.map(|d| Mutex::new(phase.allows(d))),
            next: [None; 4],
        }
    }

    /// Reads the signal for `direction` under that direction's lock only.
    pub fn is_open(&self, direction: Direction) -> bool {
        let guard = self.signals[direction.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Same as `is_open` for a raw direction code; unknown codes read as closed.
    pub fn is_open_code(&self, code: u8) -> bool {
        match Direction::try_from(code) {
            Ok(direction) => self.is_open(direction),
            Err(_) => false,
        }
    }

    /// Writes the signal for `direction` under that direction's lock only.
    pub fn set_open(&self, direction: Direction, open: bool) {
        let mut guard = self.signals[direction.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = open;
    }

    /// Moves the signals from `from` to `from.next()`.
    ///
    /// Directions of the outgoing phase are closed before the incoming ones
    /// open, so two conflicting directions are never observed open together.
    pub fn switch_phase(&self, from: Phase) -> Phase {
        let to = from.next();
        for direction in from.open_directions() {
            self.set_open(direction, false);
        }
        for direction in to.open_directions() {
            self.set_open(direction, true);
        }
        to
    }

    pub fn signals(&self) -> SignalSnapshot {
        SignalSnapshot {
            ns: self.is_open(Direction::NorthSouth),
            sn: self.is_open(Direction::SouthNorth),
            ew: self.is_open(Direction::EastWest),
            we: self.is_open(Direction::WestEast),
        }
    }

    pub fn next(&self, direction: Direction) -> Option<IntersectionIndex> {
        self.next[direction.index()]
    }

    pub(crate) fn connect(&mut self, direction: Direction, to: IntersectionIndex) {
        self.next[direction.index()] = Some(to);
    }
}
