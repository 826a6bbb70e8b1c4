//! # Stack Builder
//!
//! Collects every asset uploaded during a run and, once the workers are
//! done, groups related uploads into stacks.
//!
//! ## Grouping
//!
//! Two uploads land in the same stack when either
//! - they share a parent folder and were captured within the burst window of
//!   each other (consecutive shots chain, so a ten-frame burst forms one
//!   stack), or
//! - they share a file stem and one of them is a camera raw file (`DSC_1.NEF`
//!   and `DSC_1.JPG`, even from different folders).
//!
//! Only groups of two or more become stacks.
//!
//! ## Cover
//!
//! A JPEG member is preferred as cover. Among equals the earliest capture
//! time wins, then the member that was uploaded first.
//!
//! Workers only append to an unbounded channel; the channel is drained
//! exactly once by [`StackBuilder::build_stacks`].

use bridge_traits::LocalAssetFile;
use chrono::{DateTime, Duration, Utc};
use core_async::sync::{mpsc, Mutex};
use std::collections::HashMap;
use tracing::debug;

use crate::media::{is_jpeg, media_kind, MediaKind};

/// One uploaded asset waiting for the stack flush.
#[derive(Debug, Clone)]
struct StackEntry {
    seq: usize,
    id: String,
    file_name: String,
    parent: String,
    stem: String,
    ext: String,
    date: Option<DateTime<Utc>>,
}

/// A group of related uploads presented under one cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub cover_id: String,
    /// Members other than the cover.
    pub ids: Vec<String>,
    /// File names of every member, cover first.
    pub names: Vec<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Accumulates uploads from concurrent workers.
#[derive(Debug)]
pub struct StackBuilder {
    burst_window: Duration,
    sender: mpsc::UnboundedSender<(String, LocalAssetFile)>,
    receiver: Mutex<mpsc::UnboundedReceiver<(String, LocalAssetFile)>>,
}

impl StackBuilder {
    pub fn new(burst_window_ms: i64) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            burst_window: Duration::milliseconds(burst_window_ms),
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Records an upload. Safe to call from any number of workers.
    pub fn add(&self, id: &str, file: &LocalAssetFile) {
        // The receiver lives as long as `self`, so the send cannot fail.
        let _ = self.sender.send((id.to_string(), file.clone()));
    }

    /// Drains everything recorded so far and groups it into stacks, sorted
    /// by cover date. A second call only sees uploads added since the first.
    pub async fn build_stacks(&self) -> Vec<Stack> {
        let mut entries = Vec::new();
        {
            let mut receiver = self.receiver.lock().await;
            while let Ok((id, file)) = receiver.try_recv() {
                entries.push(entry_for(entries.len(), id, &file));
            }
        }
        debug!("Grouping {} uploaded assets into stacks", entries.len());
        group(entries, self.burst_window)
    }
}

fn entry_for(seq: usize, id: String, file: &LocalAssetFile) -> StackEntry {
    let name = file.display_name();
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name.clone(),
    };
    StackEntry {
        seq,
        id,
        file_name: file.file_name.clone(),
        parent: file.parent_dir().to_string(),
        stem: stem.to_lowercase(),
        ext: file.extension().unwrap_or_default(),
        date: file.date_taken,
    }
}

fn is_raw(entry: &StackEntry) -> bool {
    media_kind(&entry.ext) == Some(MediaKind::Raw)
}

/// Disjoint-set forest over entry positions.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

fn group(entries: Vec<StackEntry>, burst_window: Duration) -> Vec<Stack> {
    let mut sets = UnionFind::new(entries.len());

    let mut by_parent: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        by_parent.entry(entry.parent.as_str()).or_default().push(i);
    }

    for members in by_parent.values() {
        // Bursts: chain consecutive captures inside the window.
        let mut dated: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| entries[i].date.is_some())
            .collect();
        dated.sort_by_key(|&i| (entries[i].date, entries[i].seq));
        for pair in dated.windows(2) {
            if let (Some(a), Some(b)) = (entries[pair[0]].date, entries[pair[1]].date) {
                if b - a <= burst_window {
                    sets.union(pair[0], pair[1]);
                }
            }
        }
    }

    // RAW + processed pairs: same stem, different extension, one raw. Folders
    // do not matter here.
    let mut by_stem: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        by_stem.entry(entry.stem.as_str()).or_default().push(i);
    }
    for same_stem in by_stem.values() {
        for (n, &a) in same_stem.iter().enumerate() {
            for &b in &same_stem[n + 1..] {
                let (ea, eb) = (&entries[a], &entries[b]);
                if ea.ext != eb.ext && (is_raw(ea) || is_raw(eb)) {
                    sets.union(a, b);
                }
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..entries.len() {
        let root = sets.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut stacks: Vec<Stack> = groups
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|members| build_stack(&entries, members))
        .collect();

    stacks.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.cover_id.cmp(&b.cover_id)));
    stacks
}

fn build_stack(entries: &[StackEntry], mut members: Vec<usize>) -> Stack {
    // JPEG first, then earliest capture (unknown dates last), then upload order.
    members.sort_by_key(|&i| {
        let e = &entries[i];
        (!is_jpeg(&e.ext), e.date.is_none(), e.date, e.seq)
    });

    let cover = &entries[members[0]];
    Stack {
        cover_id: cover.id.clone(),
        ids: members[1..].iter().map(|&i| entries[i].id.clone()).collect(),
        names: members
            .iter()
            .map(|&i| entries[i].file_name.clone())
            .collect(),
        date: cover.date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn shot(name: &str, secs: i64) -> LocalAssetFile {
        let base = Utc.with_ymd_and_hms(2023, 5, 1, 9, 0, 0).unwrap();
        LocalAssetFile::new(name, 10).with_date_taken(base + Duration::seconds(secs))
    }

    #[core_async::test]
    async fn test_burst_chains_consecutive_shots() {
        let builder = StackBuilder::new(1_000);
        builder.add("a", &shot("trip/IMG_1.JPG", 0));
        builder.add("b", &shot("trip/IMG_2.JPG", 1));
        builder.add("c", &shot("trip/IMG_3.JPG", 2));
        builder.add("d", &shot("trip/IMG_4.JPG", 60));

        let stacks = builder.build_stacks().await;

        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].cover_id, "a");
        assert_eq!(stacks[0].ids, vec!["b", "c"]);
        assert_eq!(stacks[0].names.len(), 3);
    }

    #[core_async::test]
    async fn test_raw_jpeg_pair_prefers_jpeg_cover() {
        let builder = StackBuilder::new(1_000);
        builder.add("raw", &shot("trip/DSC_0042.NEF", 0));
        builder.add("jpg", &shot("trip/DSC_0042.JPG", 30));
        builder.add("other", &shot("trip/DSC_0043.NEF", 600));

        let stacks = builder.build_stacks().await;

        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].cover_id, "jpg");
        assert_eq!(stacks[0].ids, vec!["raw"]);
    }

    #[core_async::test]
    async fn test_bursts_do_not_cross_folders() {
        let builder = StackBuilder::new(1_000);
        builder.add("a", &shot("day1/IMG_1.JPG", 0));
        builder.add("b", &shot("day2/IMG_2.JPG", 0));

        assert!(builder.build_stacks().await.is_empty());
    }

    #[core_async::test]
    async fn test_raw_pair_stacks_across_folders() {
        let builder = StackBuilder::new(0);
        builder.add("raw", &shot("raw/DSC_7.NEF", 0));
        builder.add("jpg", &shot("export/DSC_7.JPG", 60_000));

        let stacks = builder.build_stacks().await;
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].cover_id, "jpg");
        assert_eq!(stacks[0].ids, vec!["raw"]);
    }

    #[core_async::test]
    async fn test_same_extension_same_stem_is_not_a_pair() {
        let builder = StackBuilder::new(0);
        builder.add("a", &shot("x/IMG_1.JPG", 0));
        builder.add("b", &shot("x/img_1.jpg", 100));

        assert!(builder.build_stacks().await.is_empty());
    }

    #[core_async::test]
    async fn test_drain_happens_once() {
        let builder = StackBuilder::new(1_000);
        builder.add("a", &shot("t/A.JPG", 0));
        builder.add("b", &shot("t/B.JPG", 0));

        assert_eq!(builder.build_stacks().await.len(), 1);
        assert!(builder.build_stacks().await.is_empty());
    }

    #[test]
    fn test_stacks_sorted_by_date() {
        let base = Utc.with_ymd_and_hms(2023, 5, 1, 9, 0, 0).unwrap();
        let entry = |seq: usize, id: &str, parent: &str, secs: i64| StackEntry {
            seq,
            id: id.to_string(),
            file_name: format!("{}/{}.jpg", parent, id),
            parent: parent.to_string(),
            stem: id.to_string(),
            ext: "jpg".to_string(),
            date: Some(base + Duration::seconds(secs)),
        };
        let entries = vec![
            entry(0, "late1", "b", 500),
            entry(1, "late2", "b", 500),
            entry(2, "early1", "a", 10),
            entry(3, "early2", "a", 10),
        ];

        let stacks = group(entries, Duration::milliseconds(1_000));

        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0].cover_id, "early1");
        assert_eq!(stacks[1].cover_id, "late1");
    }
}
