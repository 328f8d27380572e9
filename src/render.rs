use std::future::Future;

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const INITIAL_RENDER_CAP: usize = 400;

/// Identifies one render pass; a newer token invalidates every older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RenderToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollPolicy {
    /// In-place edits (favorite, remark) keep the reader where they were.
    Preserve,
    #[default]
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<T> {
    pub token: RenderToken,
    /// True for the first chunk; the host clears its container then.
    pub replace: bool,
    pub items: Vec<T>,
    /// Set on the final chunk.
    pub done: Option<Completion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub rendered: usize,
    /// Items withheld by the cap; drives the "load all" affordance.
    pub hidden: usize,
    pub scroll: ScrollPolicy,
}

#[derive(Debug)]
struct Pass<T> {
    token: RenderToken,
    items: std::vec::IntoIter<T>,
    emitted: usize,
    hidden: usize,
    scroll: ScrollPolicy,
}

/// Splits a list into fixed-size chunks inserted across successive frames,
/// capping the initial render until the host asks for everything.
#[derive(Debug)]
pub struct ChunkedList<T> {
    chunk_size: usize,
    cap: Option<usize>,
    last_token: u64,
    pass: Option<Pass<T>>,
}

impl<T> ChunkedList<T> {
    pub fn new(chunk_size: usize, cap: Option<usize>) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            cap,
            last_token: 0,
            pass: None,
        }
    }

    pub fn is_capped(&self) -> bool {
        self.cap.is_some()
    }

    /// Lifts the cap; the caller re-renders afterwards.
    pub fn show_all(&mut self) {
        self.cap = None;
    }

    pub fn set_cap(&mut self, cap: Option<usize>) {
        self.cap = cap;
    }

    /// Starts a pass over `items`, abandoning any pass still in flight.
    pub fn begin(&mut self, items: Vec<T>, scroll: ScrollPolicy) -> RenderToken {
        self.last_token += 1;
        let token = RenderToken(self.last_token);
        let total = items.len();
        let visible = self.cap.map_or(total, |cap| cap.min(total));
        let mut items = items;
        items.truncate(visible);
        self.pass = Some(Pass {
            token,
            items: items.into_iter(),
            emitted: 0,
            hidden: total - visible,
            scroll,
        });
        token
    }

    pub fn is_current(&self, token: RenderToken) -> bool {
        self.pass.as_ref().is_some_and(|pass| pass.token == token)
    }

    /// Next chunk for `token`, or `None` once it is finished or superseded.
    pub fn next_chunk(&mut self, token: RenderToken) -> Option<Chunk<T>> {
        let pass = self.pass.as_mut().filter(|pass| pass.token == token)?;
        let replace = pass.emitted == 0;
        let items: Vec<T> = pass.items.by_ref().take(self.chunk_size).collect();
        if items.is_empty() && !replace {
            self.pass = None;
            return None;
        }
        pass.emitted += items.len();

        let done = (pass.items.len() == 0).then_some(Completion {
            rendered: pass.emitted,
            hidden: pass.hidden,
            scroll: pass.scroll,
        });
        if done.is_some() {
            self.pass = None;
        }
        Some(Chunk {
            token,
            replace,
            items,
            done,
        })
    }
}

/// Feeds every chunk of `token` to `sink`, yielding to the runtime between
/// chunks the way a page yields between animation frames.
pub async fn drive<T, F, Y, Fut>(list: &mut ChunkedList<T>, token: RenderToken, mut sink: F, mut yield_frame: Y)
where
    F: FnMut(Chunk<T>),
    Y: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(chunk) = list.next_chunk(token) {
        let finished = chunk.done.is_some();
        sink(chunk);
        if finished {
            break;
        }
        yield_frame().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_in_fixed_chunks() {
        let mut list = ChunkedList::new(2, None);
        let token = list.begin(vec![1, 2, 3, 4, 5], ScrollPolicy::Reset);

        let first = list.next_chunk(token).unwrap();
        assert!(first.replace);
        assert_eq!(first.items, vec![1, 2]);
        assert_eq!(list.next_chunk(token).unwrap().items, vec![3, 4]);
        let last = list.next_chunk(token).unwrap();
        assert_eq!(last.items, vec![5]);
        assert_eq!(
            last.done,
            Some(Completion {
                rendered: 5,
                hidden: 0,
                scroll: ScrollPolicy::Reset
            })
        );
        assert!(list.next_chunk(token).is_none());
    }

    #[test]
    fn newer_pass_invalidates_stale_token() {
        let mut list = ChunkedList::new(1, None);
        let stale = list.begin(vec!["a", "b", "c"], ScrollPolicy::Reset);
        assert!(list.next_chunk(stale).is_some());

        let fresh = list.begin(vec!["x"], ScrollPolicy::Preserve);
        assert!(list.next_chunk(stale).is_none());
        assert!(!list.is_current(stale));
        let chunk = list.next_chunk(fresh).unwrap();
        assert!(chunk.replace);
        assert_eq!(chunk.items, vec!["x"]);
        assert_eq!(chunk.done.unwrap().scroll, ScrollPolicy::Preserve);
    }

    #[test]
    fn cap_hides_overflow_until_show_all() {
        let mut list = ChunkedList::new(10, Some(3));
        let token = list.begin((0..5).collect(), ScrollPolicy::Reset);
        let chunk = list.next_chunk(token).unwrap();
        assert_eq!(chunk.items, vec![0, 1, 2]);
        assert_eq!(chunk.done.unwrap().hidden, 2);

        list.show_all();
        let token = list.begin((0..5).collect(), ScrollPolicy::Reset);
        let chunk = list.next_chunk(token).unwrap();
        assert_eq!(chunk.items.len(), 5);
        assert_eq!(chunk.done.unwrap().hidden, 0);
    }

    #[test]
    fn empty_list_still_clears_container() {
        let mut list: ChunkedList<u8> = ChunkedList::new(4, None);
        let token = list.begin(Vec::new(), ScrollPolicy::Reset);
        let chunk = list.next_chunk(token).unwrap();
        assert!(chunk.replace);
        assert!(chunk.items.is_empty());
        assert!(chunk.done.is_some());
    }

    #[tokio::test]
    async fn drive_delivers_all_chunks_in_order() {
        let mut list = ChunkedList::new(2, None);
        let token = list.begin(vec![1, 2, 3], ScrollPolicy::Reset);
        let mut seen = Vec::new();
        drive(&mut list, token, |chunk| seen.extend(chunk.items), tokio::task::yield_now).await;
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
