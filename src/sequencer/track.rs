//! Per-row interval model: which stretches of a grid row are lit and still
//! waiting to fire their start or stop event.

/// Upper boundary of a [`Range`].
///
/// `At` is declared first so that the derived ordering puts every bounded end
/// before `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum End {
    /// The range has reached this position (exclusive).
    At(i32),
    /// No stop has been pressed yet; the range runs to the end of the row.
    Open,
}

/// A contiguous span of positions. A start of `-1` means the range has
/// already passed position zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i32,
    pub end: End,
}

impl Range {
    pub fn open(start: i32) -> Self {
        Self {
            start,
            end: End::Open,
        }
    }

    pub fn bounded(start: i32, end: i32) -> Self {
        Self {
            start,
            end: End::At(end),
        }
    }

    fn strictly_contains(&self, position: i32) -> bool {
        position > self.start
            && match self.end {
                End::Open => true,
                End::At(end) => position < end,
            }
    }

    /// True when `start` touches or falls inside this range.
    fn reaches(&self, start: i32) -> bool {
        match self.end {
            End::Open => true,
            End::At(end) => end >= start,
        }
    }

    fn is_expired(&self) -> bool {
        self.start < 0 && matches!(self.end, End::At(end) if end < 0)
    }
}

/// The ranges of one grid row, kept sorted by start, disjoint, and with
/// touching neighbours merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    ranges: Vec<Range>,
    max_position: usize,
}

impl Track {
    pub fn new(max_position: usize) -> Self {
        Self {
            ranges: Vec::new(),
            max_position,
        }
    }

    pub fn max_position(&self) -> usize {
        self.max_position
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn first(&self) -> Option<&Range> {
        self.ranges.first()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Integrates a pressed position into the existing ranges.
    ///
    /// Pressing the start of a range removes it. Pressing inside an open
    /// range closes it there; pressing inside a bounded range moves the
    /// nearer boundary (the start on a tie). Any other press opens a new
    /// range, unless the last range starting after it can be pulled back to
    /// the pressed position instead.
    pub fn add(&mut self, position: usize) {
        let position = position as i32;

        if let Some(index) = self.ranges.iter().position(|r| r.start == position) {
            self.ranges.remove(index);
        } else if let Some(range) = self
            .ranges
            .iter_mut()
            .find(|r| r.strictly_contains(position))
        {
            match range.end {
                End::Open => range.end = End::At(position),
                End::At(end) => {
                    if position - range.start <= end - position {
                        range.start = position;
                    } else {
                        range.end = End::At(position);
                    }
                }
            }
        } else if let Some(range) = self.ranges.iter_mut().rev().find(|r| position < r.start) {
            range.start = position;
        } else {
            self.ranges.push(Range::open(position));
        }

        self.canonicalize();
    }

    /// Moves every range one position towards zero and drops the ones that
    /// have fully played out.
    pub fn advance(&mut self) {
        self.ranges.retain_mut(|range| {
            if range.start <= 0 && range.end == End::Open {
                // reached the start with no stop pending: stays lit
                range.start = -1;
                return true;
            }

            range.start = (range.start - 1).max(-1);
            if let End::At(end) = range.end {
                range.end = End::At((end - 1).max(-1));
            }
            !range.is_expired()
        });
    }

    /// Bit `i` is set iff position `i` lies within some range.
    pub fn mask(&self) -> u64 {
        self.ranges.iter().fold(0, |mask, range| {
            let start = range.start.max(0) as usize;
            let end = match range.end {
                End::Open => self.max_position,
                End::At(end) => (end.max(0) as usize).min(self.max_position),
            };
            (start..end).fold(mask, |mask, i| mask | 1u64 << i)
        })
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    fn canonicalize(&mut self) {
        self.ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<Range> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if last.reaches(range.start) => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }
}
