//! Greedy size-bounded chunking.

/// Splits `items` into consecutive chunks whose summed `size_of` stays at or
/// below `bound`.
///
/// Items are taken in order. An item that would push the open chunk past the
/// bound closes it and starts the next one; an item that alone exceeds the
/// bound gets a chunk of its own. Empty input yields no chunks.
pub fn chunk<T, F>(items: &[T], bound: usize, size_of: F) -> Vec<&[T]>
where
    F: Fn(&T) -> usize,
{
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut running = 0usize;

    for (index, item) in items.iter().enumerate() {
        let size = size_of(item);
        if index > start && running.saturating_add(size) > bound {
            chunks.push(&items[start..index]);
            start = index;
            running = 0;
        }
        running = running.saturating_add(size);
    }

    if start < items.len() {
        chunks.push(&items[start..]);
    }
    chunks
}
