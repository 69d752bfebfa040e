//! Chains: ordered runs of snarls sharing boundary nodes end-to-start.
//!
//! A chain stores [`ChainLink`]s — a snarl reference plus the snarl's
//! orientation relative to the chain. Six cursor modes are exposed:
//! forward, reverse, and reverse-complement, each with a begin and an end
//! position. Reverse iteration has an explicit pre-begin state, reached by
//! advancing past the left end; advancing past either terminal state is a
//! caller bug and panics.

use crate::manager::SnarlRef;

/// Error type for chain operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    /// A snarl passed to `begin_from`/`end_from` does not bound the chain.
    #[error("snarl does not bound this chain")]
    NotABoundingSnarl,
}

/// One entry of a chain: a snarl and its orientation within the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainLink {
    /// The snarl, as owned by the manager.
    pub snarl: SnarlRef,
    /// Whether the snarl is backward relative to the chain.
    pub backward: bool,
}

/// An ordered sequence of oriented snarls.
///
/// An empty chain has no links; a cyclic chain has equal start and end
/// endpoints but still contains links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    links: Vec<ChainLink>,
}

/// Which way a cursor walks the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Where a cursor currently points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    /// On the link at this index.
    At(usize),
    /// Past the right end.
    End,
    /// Before the left end (the "reverse end" state).
    REnd,
}

impl Chain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chain from links.
    pub fn from_links(links: Vec<ChainLink>) -> Self {
        Self { links }
    }

    /// Number of snarls in the chain.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if the chain has no snarls.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The links in chain order.
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub(crate) fn links_mut(&mut self) -> &mut [ChainLink] {
        &mut self.links
    }

    /// The first link, if any.
    pub fn first(&self) -> Option<ChainLink> {
        self.links.first().copied()
    }

    /// The last link, if any.
    pub fn last(&self) -> Option<ChainLink> {
        self.links.last().copied()
    }

    /// True if the first snarl is backward relative to the chain.
    pub fn start_backward(&self) -> bool {
        self.links.first().map_or(false, |link| link.backward)
    }

    /// True if the last snarl is backward relative to the chain.
    pub fn end_backward(&self) -> bool {
        self.links.last().map_or(false, |link| link.backward)
    }

    /// Cursor on the first link, walking left to right.
    pub fn begin(&self) -> ChainCursor<'_> {
        ChainCursor {
            chain: self,
            direction: Direction::Forward,
            complement: false,
            state: if self.is_empty() {
                CursorState::End
            } else {
                CursorState::At(0)
            },
        }
    }

    /// Cursor past the last link, terminating forward walks.
    pub fn end(&self) -> ChainCursor<'_> {
        ChainCursor {
            chain: self,
            direction: Direction::Forward,
            complement: false,
            state: CursorState::End,
        }
    }

    /// Cursor on the last link, walking right to left.
    pub fn rbegin(&self) -> ChainCursor<'_> {
        ChainCursor {
            chain: self,
            direction: Direction::Reverse,
            complement: false,
            state: if self.is_empty() {
                CursorState::REnd
            } else {
                CursorState::At(self.links.len() - 1)
            },
        }
    }

    /// Cursor before the first link, terminating reverse walks.
    pub fn rend(&self) -> ChainCursor<'_> {
        ChainCursor {
            chain: self,
            direction: Direction::Reverse,
            complement: false,
            state: CursorState::REnd,
        }
    }

    /// Reverse-complement begin: like [`Chain::rbegin`] but every yielded
    /// orientation is inverted, giving the chain as seen walking it
    /// backwards.
    pub fn rcbegin(&self) -> ChainCursor<'_> {
        let mut cursor = self.rbegin();
        cursor.complement = true;
        cursor
    }

    /// Terminator for reverse-complement walks.
    pub fn rcend(&self) -> ChainCursor<'_> {
        let mut cursor = self.rend();
        cursor.complement = true;
        cursor
    }

    /// Begin a traversal from one of the chain's bounding snarls, read
    /// inward in the given orientation: the forward traversal if the
    /// snarl is the leftmost link in matching orientation, the
    /// reverse-complement traversal if it is the rightmost. Naming a
    /// snarl that does not bound the chain is an error.
    pub fn begin_from(
        &self,
        bounding_snarl: SnarlRef,
        inward_backward: bool,
    ) -> Result<ChainCursor<'_>, ChainError> {
        match (self.first(), self.last()) {
            (Some(first), _) if first.snarl == bounding_snarl && inward_backward == first.backward => {
                Ok(self.begin())
            }
            (_, Some(last)) if last.snarl == bounding_snarl => Ok(self.rcbegin()),
            _ => Err(ChainError::NotABoundingSnarl),
        }
    }

    /// The end cursor matching [`Chain::begin_from`] for the same
    /// bounding snarl and orientation.
    pub fn end_from(
        &self,
        bounding_snarl: SnarlRef,
        inward_backward: bool,
    ) -> Result<ChainCursor<'_>, ChainError> {
        match (self.first(), self.last()) {
            (Some(first), _) if first.snarl == bounding_snarl && inward_backward == first.backward => {
                Ok(self.end())
            }
            (_, Some(last)) if last.snarl == bounding_snarl => Ok(self.rcend()),
            _ => Err(ChainError::NotABoundingSnarl),
        }
    }
}

/// A position within a chain traversal.
///
/// Dereference with [`ChainCursor::get`]; the yielded orientation is the
/// stored orientation XOR the cursor's complement flag. Advancing past
/// the forward end or the reverse end panics.
#[derive(Debug, Clone, Copy)]
pub struct ChainCursor<'c> {
    chain: &'c Chain,
    direction: Direction,
    complement: bool,
    state: CursorState,
}

impl ChainCursor<'_> {
    /// The link under the cursor, with its effective orientation.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is at a terminal state.
    pub fn get(&self) -> ChainLink {
        match self.state {
            CursorState::At(index) => {
                let link = self.chain.links[index];
                ChainLink {
                    snarl: link.snarl,
                    backward: link.backward != self.complement,
                }
            }
            CursorState::End | CursorState::REnd => {
                panic!("dereferenced a chain cursor outside the chain")
            }
        }
    }

    /// True if the cursor sits at a terminal state rather than on a link.
    pub fn at_terminal(&self) -> bool {
        !matches!(self.state, CursorState::At(_))
    }

    /// Step one link in the cursor's direction.
    ///
    /// # Panics
    ///
    /// Panics when stepping past the forward end, or past the reverse end
    /// state during reverse iteration.
    pub fn advance(&mut self) {
        match self.direction {
            Direction::Forward => match self.state {
                CursorState::At(index) => {
                    self.state = if index + 1 == self.chain.len() {
                        CursorState::End
                    } else {
                        CursorState::At(index + 1)
                    };
                }
                CursorState::End => panic!("walked off the end of a chain"),
                CursorState::REnd => panic!("advanced a forward chain cursor from before the chain"),
            },
            Direction::Reverse => match self.state {
                CursorState::At(index) => {
                    self.state = if index == 0 {
                        CursorState::REnd
                    } else {
                        CursorState::At(index - 1)
                    };
                }
                CursorState::REnd => panic!("walked off the start of a chain"),
                CursorState::End => panic!("advanced a reverse chain cursor from past the chain"),
            },
        }
    }
}

impl PartialEq for ChainCursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.chain, other.chain)
            && self.direction == other.direction
            && self.complement == other.complement
            && self.state == other.state
    }
}

impl Eq for ChainCursor<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(index: usize, backward: bool) -> ChainLink {
        ChainLink {
            snarl: SnarlRef(index),
            backward,
        }
    }

    fn chain_of(flags: &[bool]) -> Chain {
        Chain::from_links(
            flags
                .iter()
                .enumerate()
                .map(|(index, backward)| link(index, *backward))
                .collect(),
        )
    }

    fn collect(mut begin: ChainCursor<'_>, end: ChainCursor<'_>) -> Vec<ChainLink> {
        let mut out = Vec::new();
        while begin != end {
            out.push(begin.get());
            begin.advance();
        }
        out
    }

    #[test]
    fn test_forward_iteration() {
        let chain = chain_of(&[false, true, false]);
        let got = collect(chain.begin(), chain.end());
        assert_eq!(got, vec![link(0, false), link(1, true), link(2, false)]);
    }

    #[test]
    fn test_reverse_iteration() {
        let chain = chain_of(&[false, true, false]);
        let got = collect(chain.rbegin(), chain.rend());
        assert_eq!(got, vec![link(2, false), link(1, true), link(0, false)]);
    }

    #[test]
    fn test_reverse_complement_law() {
        let chain = chain_of(&[false, true, false, true]);
        let forward = collect(chain.begin(), chain.end());
        let rc = collect(chain.rcbegin(), chain.rcend());

        let n = forward.len();
        for (index, got) in rc.iter().enumerate() {
            let mirror = forward[n - 1 - index];
            assert_eq!(got.snarl, mirror.snarl);
            assert_eq!(got.backward, !mirror.backward);
        }
    }

    #[test]
    fn test_empty_chain_cursors() {
        let chain = Chain::new();
        assert_eq!(chain.begin(), chain.end());
        assert_eq!(chain.rbegin(), chain.rend());
        assert_eq!(chain.rcbegin(), chain.rcend());
    }

    #[test]
    #[should_panic(expected = "walked off the end of a chain")]
    fn test_walk_off_end_panics() {
        let chain = chain_of(&[false]);
        let mut cursor = chain.begin();
        cursor.advance();
        cursor.advance();
    }

    #[test]
    #[should_panic(expected = "walked off the start of a chain")]
    fn test_walk_off_start_panics() {
        let chain = chain_of(&[false]);
        let mut cursor = chain.rbegin();
        cursor.advance();
        cursor.advance();
    }

    #[test]
    fn test_begin_from_left_end() {
        let chain = chain_of(&[false, false]);
        let cursor = chain.begin_from(SnarlRef(0), false).unwrap();
        assert_eq!(cursor, chain.begin());
        let end = chain.end_from(SnarlRef(0), false).unwrap();
        assert_eq!(end, chain.end());
    }

    #[test]
    fn test_begin_from_right_end_is_reverse_complement() {
        let chain = chain_of(&[false, false]);
        let cursor = chain.begin_from(SnarlRef(1), true).unwrap();
        assert_eq!(cursor, chain.rcbegin());
        let end = chain.end_from(SnarlRef(1), true).unwrap();
        assert_eq!(end, chain.rcend());
    }

    #[test]
    fn test_begin_from_non_bounding_snarl_fails() {
        let chain = chain_of(&[false, false, false]);
        assert!(chain.begin_from(SnarlRef(1), false).is_err());
        assert!(chain.end_from(SnarlRef(7), false).is_err());
        assert!(Chain::new().begin_from(SnarlRef(0), false).is_err());
    }
}
