//! Adaptive radix tree
//!
//! Byte-string keyed tree where each inner node switches layout as its
//! fan-out changes:
//!
//! ```text
//! Node4    sorted keys + children, linear scan        (1..=4 children)
//! Node16   sorted keys + children, binary search      (5..=16 children)
//! Node48   256-entry byte → slot table + 48 slots     (17..=48 children)
//! Node256  direct 256-entry child array               (49..=256 children)
//! ```
//!
//! Paths without branching are collapsed into a per-node prefix. A node can
//! carry a value and children at the same time, so a key may be a prefix of
//! another key.

use std::mem;

const NODE4_MAX: usize = 4;
const NODE16_MAX: usize = 16;
const NODE48_MAX: usize = 48;

// Shrink below the next layout's capacity so a node hovering at a
// boundary does not flip layouts on every insert/remove.
const NODE16_SHRINK_AT: usize = 3;
const NODE48_SHRINK_AT: usize = 12;
const NODE256_SHRINK_AT: usize = 37;

/// Layout of a node's child table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Node4,
    Node16,
    Node48,
    Node256,
}

enum Children<V> {
    Node4 {
        keys: Vec<u8>,
        nodes: Vec<Box<Node<V>>>,
    },
    Node16 {
        keys: Vec<u8>,
        nodes: Vec<Box<Node<V>>>,
    },
    Node48 {
        /// byte → slot + 1 (0 = no child)
        index: Box<[u8; 256]>,
        slots: Vec<Option<Box<Node<V>>>>,
        len: usize,
    },
    Node256 {
        nodes: Box<[Option<Box<Node<V>>>; 256]>,
        len: usize,
    },
}

impl<V> Children<V> {
    fn new() -> Self {
        Children::Node4 {
            keys: Vec::new(),
            nodes: Vec::new(),
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            Children::Node4 { .. } => NodeKind::Node4,
            Children::Node16 { .. } => NodeKind::Node16,
            Children::Node48 { .. } => NodeKind::Node48,
            Children::Node256 { .. } => NodeKind::Node256,
        }
    }

    fn len(&self) -> usize {
        match self {
            Children::Node4 { keys, .. } | Children::Node16 { keys, .. } => keys.len(),
            Children::Node48 { len, .. } | Children::Node256 { len, .. } => *len,
        }
    }

    fn find(&self, byte: u8) -> Option<&Node<V>> {
        match self {
            Children::Node4 { keys, nodes } => {
                let i = keys.iter().position(|&k| k == byte)?;
                Some(&nodes[i])
            }
            Children::Node16 { keys, nodes } => {
                let i = keys.binary_search(&byte).ok()?;
                Some(&nodes[i])
            }
            Children::Node48 { index, slots, .. } => match index[byte as usize] {
                0 => None,
                slot => slots[slot as usize - 1].as_deref(),
            },
            Children::Node256 { nodes, .. } => nodes[byte as usize].as_deref(),
        }
    }

    fn find_mut(&mut self, byte: u8) -> Option<&mut Node<V>> {
        match self {
            Children::Node4 { keys, nodes } => {
                let i = keys.iter().position(|&k| k == byte)?;
                Some(&mut nodes[i])
            }
            Children::Node16 { keys, nodes } => {
                let i = keys.binary_search(&byte).ok()?;
                Some(&mut nodes[i])
            }
            Children::Node48 { index, slots, .. } => match index[byte as usize] {
                0 => None,
                slot => slots[slot as usize - 1].as_deref_mut(),
            },
            Children::Node256 { nodes, .. } => nodes[byte as usize].as_deref_mut(),
        }
    }

    /// Add a child under a byte that has none yet
    fn insert(&mut self, byte: u8, child: Box<Node<V>>) {
        match self {
            Children::Node4 { keys, nodes } if keys.len() < NODE4_MAX => {
                let i = keys.partition_point(|&k| k < byte);
                keys.insert(i, byte);
                nodes.insert(i, child);
            }
            Children::Node16 { keys, nodes } if keys.len() < NODE16_MAX => {
                let i = keys.partition_point(|&k| k < byte);
                keys.insert(i, byte);
                nodes.insert(i, child);
            }
            Children::Node48 { index, slots, len } if *len < NODE48_MAX => {
                let slot = match slots.iter().position(Option::is_none) {
                    Some(free) => free,
                    None => {
                        slots.push(None);
                        slots.len() - 1
                    }
                };
                slots[slot] = Some(child);
                index[byte as usize] = (slot + 1) as u8;
                *len += 1;
            }
            Children::Node256 { nodes, len } => {
                if nodes[byte as usize].replace(child).is_none() {
                    *len += 1;
                }
            }
            _ => {
                self.grow();
                self.insert(byte, child);
            }
        }
    }

    fn remove(&mut self, byte: u8) -> Option<Box<Node<V>>> {
        let removed = match self {
            Children::Node4 { keys, nodes } | Children::Node16 { keys, nodes } => {
                let i = keys.iter().position(|&k| k == byte)?;
                keys.remove(i);
                Some(nodes.remove(i))
            }
            Children::Node48 { index, slots, len } => {
                let slot = index[byte as usize];
                if slot == 0 {
                    return None;
                }
                index[byte as usize] = 0;
                *len -= 1;
                slots[slot as usize - 1].take()
            }
            Children::Node256 { nodes, len } => {
                let node = nodes[byte as usize].take()?;
                *len -= 1;
                Some(node)
            }
        };
        self.shrink();
        removed
    }

    /// Detach the single remaining child
    fn take_only(&mut self) -> Option<(u8, Box<Node<V>>)> {
        if self.len() != 1 {
            return None;
        }
        let mut only = None;
        self.for_each(&mut |byte, _| only = Some(byte));
        let byte = only?;
        let node = self.remove(byte)?;
        Some((byte, node))
    }

    /// Visit children in ascending byte order
    fn for_each(&self, f: &mut dyn FnMut(u8, &Node<V>)) {
        match self {
            Children::Node4 { keys, nodes } | Children::Node16 { keys, nodes } => {
                for (byte, node) in keys.iter().zip(nodes) {
                    f(*byte, node);
                }
            }
            Children::Node48 { index, slots, .. } => {
                for byte in 0..=255u8 {
                    let slot = index[byte as usize];
                    if slot == 0 {
                        continue;
                    }
                    if let Some(node) = &slots[slot as usize - 1] {
                        f(byte, node);
                    }
                }
            }
            Children::Node256 { nodes, .. } => {
                for (byte, node) in nodes.iter().enumerate() {
                    if let Some(node) = node {
                        f(byte as u8, node);
                    }
                }
            }
        }
    }

    fn grow(&mut self) {
        *self = match mem::replace(self, Children::new()) {
            Children::Node4 { keys, nodes } => Children::Node16 { keys, nodes },
            Children::Node16 { keys, nodes } => {
                let mut index = Box::new([0u8; 256]);
                let mut slots = Vec::with_capacity(NODE48_MAX);
                let len = keys.len();
                for (byte, node) in keys.into_iter().zip(nodes) {
                    slots.push(Some(node));
                    index[byte as usize] = slots.len() as u8;
                }
                Children::Node48 { index, slots, len }
            }
            Children::Node48 {
                index,
                mut slots,
                len,
            } => {
                let mut nodes: Box<[Option<Box<Node<V>>>; 256]> =
                    Box::new(std::array::from_fn(|_| None));
                for (byte, &slot) in index.iter().enumerate() {
                    if slot != 0 {
                        nodes[byte] = slots[slot as usize - 1].take();
                    }
                }
                Children::Node256 { nodes, len }
            }
            full @ Children::Node256 { .. } => full,
        };
    }

    fn shrink(&mut self) {
        *self = match mem::replace(self, Children::new()) {
            Children::Node16 { keys, nodes } if keys.len() <= NODE16_SHRINK_AT => {
                Children::Node4 { keys, nodes }
            }
            Children::Node48 {
                index,
                mut slots,
                len,
            } if len <= NODE48_SHRINK_AT => {
                let mut keys = Vec::with_capacity(NODE16_MAX);
                let mut nodes = Vec::with_capacity(NODE16_MAX);
                for (byte, &slot) in index.iter().enumerate() {
                    if slot == 0 {
                        continue;
                    }
                    if let Some(node) = slots[slot as usize - 1].take() {
                        keys.push(byte as u8);
                        nodes.push(node);
                    }
                }
                Children::Node16 { keys, nodes }
            }
            Children::Node256 { mut nodes, len } if len <= NODE256_SHRINK_AT => {
                let mut index = Box::new([0u8; 256]);
                let mut slots = Vec::with_capacity(NODE48_MAX);
                for (byte, node) in nodes.iter_mut().enumerate() {
                    if let Some(node) = node.take() {
                        slots.push(Some(node));
                        index[byte] = slots.len() as u8;
                    }
                }
                Children::Node48 { index, slots, len }
            }
            other => other,
        };
    }
}

struct Node<V> {
    /// Compressed path below the byte that leads here
    prefix: Vec<u8>,
    value: Option<V>,
    children: Children<V>,
}

impl<V> Node<V> {
    fn empty() -> Self {
        Self {
            prefix: Vec::new(),
            value: None,
            children: Children::new(),
        }
    }

    fn leaf(prefix: &[u8], value: V) -> Self {
        Self {
            prefix: prefix.to_vec(),
            value: Some(value),
            children: Children::new(),
        }
    }

    /// `key` is relative to this node, starting with its prefix
    fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        let common = self
            .prefix
            .iter()
            .zip(key)
            .take_while(|(a, b)| a == b)
            .count();
        if common < self.prefix.len() {
            self.split_prefix(common);
        }

        let Some((&byte, tail)) = key[common..].split_first() else {
            return self.value.replace(value);
        };
        if let Some(child) = self.children.find_mut(byte) {
            return child.insert(tail, value);
        }
        self.children.insert(byte, Box::new(Node::leaf(tail, value)));
        None
    }

    /// Keep `prefix[..at]` here and push everything else one level down
    fn split_prefix(&mut self, at: usize) {
        let suffix = self.prefix.split_off(at);
        let lower = Node {
            prefix: suffix[1..].to_vec(),
            value: self.value.take(),
            children: mem::replace(&mut self.children, Children::new()),
        };
        self.children.insert(suffix[0], Box::new(lower));
    }

    fn remove(&mut self, key: &[u8]) -> Option<V> {
        let rest = key.strip_prefix(self.prefix.as_slice())?;
        let Some((&byte, tail)) = rest.split_first() else {
            return self.value.take();
        };

        let child = self.children.find_mut(byte)?;
        let removed = child.remove(tail)?;
        if child.value.is_none() {
            match child.children.len() {
                0 => {
                    self.children.remove(byte);
                }
                1 => child.absorb_only_child(),
                _ => {}
            }
        }
        Some(removed)
    }

    /// Merge a value-less node with its single child
    fn absorb_only_child(&mut self) {
        if let Some((byte, only)) = self.children.take_only() {
            let only = *only;
            self.prefix.push(byte);
            self.prefix.extend_from_slice(&only.prefix);
            self.value = only.value;
            self.children = only.children;
        }
    }

    fn collect(&self, path: &mut Vec<u8>, out: &mut Vec<(Vec<u8>, V)>)
    where
        V: Clone,
    {
        let base = path.len();
        path.extend_from_slice(&self.prefix);
        if let Some(value) = &self.value {
            out.push((path.clone(), value.clone()));
        }
        self.children.for_each(&mut |byte, child| {
            path.push(byte);
            child.collect(path, out);
            path.pop();
        });
        path.truncate(base);
    }
}

/// Byte-string keyed adaptive radix tree
pub struct RadixTree<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for RadixTree<V> {
    fn default() -> Self {
        Self {
            root: Node::empty(),
            len: 0,
        }
    }
}

impl<V> RadixTree<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, returning the previous value
    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        let old = self.root.insert(key, value);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let mut node = &self.root;
        let mut key = key;
        loop {
            key = key.strip_prefix(node.prefix.as_slice())?;
            let Some((&byte, tail)) = key.split_first() else {
                return node.value.as_ref();
            };
            node = node.children.find(byte)?;
            key = tail;
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let removed = self.root.remove(key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All entries in ascending key order
    pub fn entries(&self) -> Vec<(Vec<u8>, V)>
    where
        V: Clone,
    {
        let mut out = Vec::with_capacity(self.len);
        self.root.collect(&mut Vec::new(), &mut out);
        out
    }

    /// Child layout of the root node
    pub fn root_kind(&self) -> NodeKind {
        self.root.children.kind()
    }
}
