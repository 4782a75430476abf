//! Node rebalancing: splitting oversized nodes and merging small ones.
//!
//! A post-edit node can hold up to `2 * PAGE_SIZE` bytes. [`split3`] cuts
//! it into at most three page-sized shards; the layout constants checked at
//! compile time guarantee three are always enough. [`merge`] is the
//! inverse, combining an underfull node with a sibling.

use smallvec::{smallvec, SmallVec};

use crate::page::{Node, ENTRY_OVERHEAD, HEADER_SIZE};
use crate::types::PAGE_SIZE;

/// The 1..3 page-sized shards produced by [`split3`].
pub type SplitShards = SmallVec<[Node; 3]>;

/// Split `src` in two, giving the left shard the largest prefix of records
/// that still fits a page once it carries its own header and index arrays.
fn split2(src: &Node) -> (Node, Node) {
    let nkeys = src.nkeys();
    assert!(nkeys >= 2, "cannot split a node with {nkeys} keys");

    // Size of a page holding records 0..n of `src` with fresh index arrays.
    // Not simply kv_pos(n): the pointer and offset arrays shrink with n.
    let left_size = |n: usize| HEADER_SIZE + n * ENTRY_OVERHEAD + src.offset(n);

    // Largest nleft in [1, nkeys - 1] whose left page still fits. A single
    // record always fits, so the lower bound is sound.
    let mut lo = 1;
    let mut hi = nkeys - 1;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if left_size(mid) <= PAGE_SIZE {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    let nleft = lo;
    assert!(
        left_size(nleft) <= PAGE_SIZE,
        "split point {nleft} leaves an oversized left page"
    );
    let nright = nkeys - nleft;

    let mut left = Node::page();
    let mut right = Node::scratch();
    left.set_header(src.node_type(), nleft);
    right.set_header(src.node_type(), nright);
    left.append_range(src, 0, 0, nleft);
    right.append_range(src, 0, nleft, nright);
    (left, right)
}

/// Cut a post-edit node into 1..3 page-sized shards, preserving record
/// order. Shards inherit the source's type tag.
pub fn split3(src: Node) -> SplitShards {
    if src.total_bytes() <= PAGE_SIZE {
        return smallvec![src.into_page()];
    }
    let (left, right) = split2(&src);
    if right.total_bytes() <= PAGE_SIZE {
        return smallvec![left, right.into_page()];
    }
    let (mid, tail) = split2(&right);
    assert!(
        tail.total_bytes() <= PAGE_SIZE,
        "node still oversized after a three-way split: {} bytes",
        tail.total_bytes()
    );
    smallvec![left, mid, tail.into_page()]
}

/// Combine two siblings into one node holding `left`'s records followed by
/// `right`'s. The caller guarantees the pair fits a single page.
pub fn merge(left: &Node, right: &Node) -> Node {
    let combined = left.total_bytes() + right.total_bytes() - HEADER_SIZE;
    assert!(
        combined <= PAGE_SIZE,
        "merged node would not fit a page: {combined} bytes"
    );
    let mut node = Node::page();
    node.set_header(left.node_type(), left.nkeys() + right.nkeys());
    node.append_range(left, 0, 0, left.nkeys());
    node.append_range(right, left.nkeys(), 0, right.nkeys());
    node
}
