use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::item::{ItemTiming, clip_to_window};
use super::timers::{Tick, TimerId, TimerQueue};
use crate::clock::{ClockSource, TempoClock};
use crate::error::{Result, SchedulerError};
use crate::events::{GroupEndedHook, LeafStartHook, LeafStopHook};

/// Stable arena address of a composition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// Opaque reference to a leaf voice/sample descriptor; resolved to a
/// natural length by the pattern data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceId(pub u64);

/// What a group item plays: a leaf voice, or another group. The two
/// variants branch exhaustively through the clip and propagation
/// algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupPayload {
    Leaf(VoiceId),
    Nested(GroupId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupItem {
    pub payload: GroupPayload,
    pub timing: ItemTiming,
}

impl GroupItem {
    pub fn leaf(voice: VoiceId, timing: ItemTiming) -> Self {
        Self {
            payload: GroupPayload::Leaf(voice),
            timing,
        }
    }

    pub fn nested(group: GroupId, timing: ItemTiming) -> Self {
        Self {
            payload: GroupPayload::Nested(group),
            timing,
        }
    }
}

/// Resolves a leaf voice to its natural length in seconds. Persisted
/// pattern data lives behind this boundary.
pub trait PatternSource: Send + Sync {
    fn natural_duration(&self, voice: VoiceId) -> Option<f64>;
}

struct Group {
    items: Vec<GroupItem>,
    /// Item indices sorted by effective end (beats) descending; the
    /// head answers the duration query without a full rescan.
    by_end_desc: Vec<usize>,
    /// Parent group -> number of times this group appears in it.
    parents: HashMap<GroupId, usize>,
    tempo: TempoClock,
    /// Derived: latest item end, in this group's beats.
    duration: f64,
    /// Completion timers of playbacks started on this group.
    pending: Vec<TimerId>,
}

impl Group {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            by_end_desc: Vec::new(),
            parents: HashMap::new(),
            tempo: TempoClock::default(),
            duration: 0.0,
            pending: Vec::new(),
        }
    }
}

/// Arena of reusable, hierarchical composition groups. Parent/child
/// links are id-based, so shared sub-patterns form a DAG without
/// owning reference cycles.
pub struct GroupArena {
    groups: HashMap<GroupId, Group>,
    next_id: u32,
    clock: Arc<dyn ClockSource>,
    provider: Option<Arc<dyn PatternSource>>,
    timers: TimerQueue<GroupId>,
    streaming: bool,
    on_leaf_start: Option<LeafStartHook>,
    on_leaf_stop: Option<LeafStopHook>,
    on_group_ended: Option<GroupEndedHook>,
}

impl GroupArena {
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            groups: HashMap::new(),
            next_id: 0,
            clock,
            provider: None,
            timers: TimerQueue::new(),
            streaming: true,
            on_leaf_start: None,
            on_leaf_stop: None,
            on_group_ended: None,
        }
    }

    pub fn set_provider(&mut self, provider: Arc<dyn PatternSource>) {
        self.provider = Some(provider);
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    pub fn set_on_leaf_start(&mut self, hook: impl FnMut(VoiceId, f64, f64, f64) + Send + 'static) {
        self.on_leaf_start = Some(Box::new(hook));
    }

    pub fn set_on_leaf_stop(&mut self, hook: impl FnMut(VoiceId) + Send + 'static) {
        self.on_leaf_stop = Some(Box::new(hook));
    }

    pub fn set_on_group_ended(&mut self, hook: impl FnMut(GroupId) + Send + 'static) {
        self.on_group_ended = Some(Box::new(hook));
    }

    pub fn create_group(&mut self) -> GroupId {
        self.next_id += 1;
        let id = GroupId(self.next_id);
        self.groups.insert(id, Group::new());
        id
    }

    /// Drops a group that no parent references anymore.
    pub fn remove_group(&mut self, gid: GroupId) -> Result<()> {
        let group = self.group(gid)?;
        if !group.parents.is_empty() {
            return Err(SchedulerError::GroupStillReferenced(gid));
        }
        self.clear_items(gid)?;
        if let Some(group) = self.groups.remove(&gid) {
            for id in group.pending {
                self.timers.cancel(id);
            }
        }
        Ok(())
    }

    pub fn bpm(&self, gid: GroupId) -> Result<f64> {
        Ok(self.group(gid)?.tempo.bpm())
    }

    /// Derived total length, in this group's beats.
    pub fn duration_beats(&self, gid: GroupId) -> Result<f64> {
        Ok(self.group(gid)?.duration)
    }

    pub fn items(&self, gid: GroupId) -> Result<&[GroupItem]> {
        Ok(&self.group(gid)?.items)
    }

    /// The same items viewed sorted by effective end, latest first.
    pub fn items_by_end_desc(&self, gid: GroupId) -> Result<Vec<&GroupItem>> {
        let group = self.group(gid)?;
        Ok(group.by_end_desc.iter().map(|&i| &group.items[i]).collect())
    }

    /// Refcount of `child` inside `parent`, 0 when absent.
    pub fn parent_count(&self, child: GroupId, parent: GroupId) -> Result<usize> {
        Ok(self.group(child)?.parents.get(&parent).copied().unwrap_or(0))
    }

    pub fn add_item(&mut self, gid: GroupId, item: GroupItem) -> Result<()> {
        item.timing.validate()?;
        self.group(gid)?;
        if let GroupPayload::Nested(child) = item.payload {
            self.group(child)?;
            if child == gid || self.reaches(child, gid)? {
                return Err(SchedulerError::GroupCycle(gid));
            }
            if let Some(group) = self.groups.get_mut(&child) {
                *group.parents.entry(gid).or_insert(0) += 1;
            }
        }
        if let Some(group) = self.groups.get_mut(&gid) {
            group.items.push(item);
        }
        self.recompute(gid)
    }

    pub fn add_items(&mut self, gid: GroupId, items: Vec<GroupItem>) -> Result<()> {
        for item in items {
            self.add_item(gid, item)?;
        }
        Ok(())
    }

    pub fn remove_item(&mut self, gid: GroupId, index: usize) -> Result<GroupItem> {
        let group = self.group(gid)?;
        if index >= group.items.len() {
            return Err(SchedulerError::UnknownItem(index));
        }
        let item = match self.groups.get_mut(&gid) {
            Some(group) => group.items.remove(index),
            None => return Err(SchedulerError::UnknownGroup(gid)),
        };
        if let GroupPayload::Nested(child) = item.payload {
            self.release_parent_ref(child, gid);
        }
        self.recompute(gid)?;
        Ok(item)
    }

    /// Removes every item, dropping the back-references into children.
    pub fn clear_items(&mut self, gid: GroupId) -> Result<()> {
        let items = std::mem::take(&mut self.group_mut(gid)?.items);
        for item in items {
            if let GroupPayload::Nested(child) = item.payload {
                self.release_parent_ref(child, gid);
            }
        }
        self.recompute(gid)
    }

    /// Changes the shared tempo of the group and of every distinct
    /// nested sub-group, then propagates the derived durations to all
    /// registered parents.
    pub fn set_tempo(&mut self, gid: GroupId, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SchedulerError::InvalidBpm(bpm));
        }
        if self.group(gid)?.tempo.bpm() == bpm {
            return Ok(());
        }
        let mut visited = HashSet::new();
        self.set_tempo_rec(gid, bpm, &mut visited)?;
        // Every retuned group may be shared with parents outside this
        // subtree; propagate from each of them.
        let mut retuned: Vec<GroupId> = visited.into_iter().collect();
        retuned.sort();
        for g in retuned {
            self.recompute(g)?;
        }
        Ok(())
    }

    fn set_tempo_rec(&mut self, gid: GroupId, bpm: f64, visited: &mut HashSet<GroupId>) -> Result<()> {
        if !visited.insert(gid) {
            return Ok(());
        }
        let children = self.nested_children(gid)?;
        for child in children {
            self.set_tempo_rec(child, bpm, visited)?;
        }
        self.group_mut(gid)?.tempo.set_bpm(bpm)?;
        self.refresh_local(gid)?;
        Ok(())
    }

    /// Recomputes the group's sorted index and derived duration, then
    /// every parent reachable from it, each group at most once per
    /// pass, children before parents.
    pub fn recompute(&mut self, gid: GroupId) -> Result<()> {
        self.group(gid)?;

        // Gather the affected set: the group plus all its ancestors.
        let mut affected = vec![gid];
        let mut seen: HashSet<GroupId> = HashSet::from([gid]);
        let mut cursor = 0;
        while cursor < affected.len() {
            for parent in self.sorted_parents(affected[cursor])? {
                if parent == gid {
                    return Err(SchedulerError::GroupCycle(gid));
                }
                if seen.insert(parent) {
                    affected.push(parent);
                }
            }
            cursor += 1;
        }

        // Kahn order over the affected set: a group refreshes only
        // after every affected child refreshed.
        let mut in_deg: HashMap<GroupId, usize> = HashMap::new();
        for &g in &affected {
            let nested = self.nested_children(g)?;
            in_deg.insert(g, nested.iter().filter(|c| seen.contains(c)).count());
        }
        let mut queue: VecDeque<GroupId> = affected
            .iter()
            .copied()
            .filter(|g| in_deg.get(g) == Some(&0))
            .collect();
        let mut processed = 0;
        while let Some(g) = queue.pop_front() {
            self.refresh_local(g)?;
            processed += 1;
            for parent in self.sorted_parents(g)? {
                if let Some(deg) = in_deg.get_mut(&parent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(parent);
                    }
                }
            }
        }
        if processed < affected.len() {
            return Err(SchedulerError::GroupCycle(gid));
        }
        Ok(())
    }

    /// Resolves absolute times for every item inside the window and
    /// emits leaf starts in item order, recursing into nested groups.
    /// `offset` and `duration` are in this group's beats; returns the
    /// scheduled window length in seconds (0 for an empty group).
    pub fn start(
        &mut self,
        gid: GroupId,
        when: Option<f64>,
        offset: Option<f64>,
        duration: Option<f64>,
    ) -> Result<f64> {
        let when = when.unwrap_or_else(|| self.clock.now());
        let mut leaves = Vec::new();
        let total = self.start_rec(gid, when, offset.unwrap_or(0.0), duration, &mut leaves)?;
        if total > 0.0 {
            let timer = self.timers.arm(when + total, gid);
            if let Some(group) = self.groups.get_mut(&gid) {
                group.pending.push(timer);
            }
        }
        let mut on_leaf_start = self.on_leaf_start.take();
        if let Some(hook) = on_leaf_start.as_mut() {
            for (voice, at, off, dur) in &leaves {
                hook(*voice, *at, *off, *dur);
            }
        }
        self.on_leaf_start = on_leaf_start;
        debug!(group = gid.0, leaves = leaves.len(), total, "group started");
        Ok(total)
    }

    fn start_rec(
        &self,
        gid: GroupId,
        when: f64,
        offset_beats: f64,
        duration_beats: Option<f64>,
        leaves: &mut Vec<(VoiceId, f64, f64, f64)>,
    ) -> Result<f64> {
        let group = self.group(gid)?;
        if group.duration <= 0.0 {
            return Ok(0.0);
        }
        let bps = group.tempo.bps();
        let offset = offset_beats / bps;
        let window = duration_beats.unwrap_or(group.duration) / bps;

        for item in &group.items {
            let start = item.timing.start_seconds(&group.tempo) - offset;
            let item_offset = item.timing.offset_seconds(&group.tempo);
            let item_duration = match item.timing.duration_seconds(&group.tempo) {
                Some(d) => d,
                None => self.natural_duration_seconds(&item.payload)?,
            };
            let Some((start, item_offset, item_duration)) =
                clip_to_window(start, item_offset, item_duration, window)
            else {
                continue;
            };
            let at = when + start;
            match item.payload {
                GroupPayload::Leaf(voice) => {
                    leaves.push((voice, at, item_offset, item_duration));
                }
                GroupPayload::Nested(child) => {
                    let child_bps = self.group(child)?.tempo.bps();
                    self.start_rec(
                        child,
                        at,
                        item_offset * child_bps,
                        Some(item_duration * child_bps),
                        leaves,
                    )?;
                }
            }
        }
        Ok(window)
    }

    /// Recursively stops every payload and resolves all pending
    /// completion notifications of the visited groups.
    pub fn stop(&mut self, gid: GroupId) -> Result<()> {
        let mut visited = HashSet::new();
        let mut leaves = Vec::new();
        let mut ended = Vec::new();
        self.stop_rec(gid, &mut visited, &mut leaves, &mut ended)?;

        let mut on_leaf_stop = self.on_leaf_stop.take();
        if let Some(hook) = on_leaf_stop.as_mut() {
            for voice in &leaves {
                hook(*voice);
            }
        }
        self.on_leaf_stop = on_leaf_stop;

        let mut on_group_ended = self.on_group_ended.take();
        if let Some(hook) = on_group_ended.as_mut() {
            for group in &ended {
                hook(*group);
            }
        }
        self.on_group_ended = on_group_ended;
        Ok(())
    }

    fn stop_rec(
        &mut self,
        gid: GroupId,
        visited: &mut HashSet<GroupId>,
        leaves: &mut Vec<VoiceId>,
        ended: &mut Vec<GroupId>,
    ) -> Result<()> {
        if !visited.insert(gid) {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.group_mut(gid)?.pending);
        for timer in pending {
            self.timers.cancel(timer);
            ended.push(gid);
        }
        let payloads: Vec<GroupPayload> = self.group(gid)?.items.iter().map(|i| i.payload).collect();
        for payload in payloads {
            match payload {
                GroupPayload::Leaf(voice) => leaves.push(voice),
                GroupPayload::Nested(child) => self.stop_rec(child, visited, leaves, ended)?,
            }
        }
        Ok(())
    }

    fn group(&self, gid: GroupId) -> Result<&Group> {
        self.groups.get(&gid).ok_or(SchedulerError::UnknownGroup(gid))
    }

    fn group_mut(&mut self, gid: GroupId) -> Result<&mut Group> {
        self.groups
            .get_mut(&gid)
            .ok_or(SchedulerError::UnknownGroup(gid))
    }

    fn release_parent_ref(&mut self, child: GroupId, parent: GroupId) {
        if let Some(group) = self.groups.get_mut(&child) {
            if let Some(count) = group.parents.get_mut(&parent) {
                *count -= 1;
                if *count == 0 {
                    group.parents.remove(&parent);
                }
            }
        }
    }

    /// Distinct nested children, in id order.
    fn nested_children(&self, gid: GroupId) -> Result<Vec<GroupId>> {
        let group = self.group(gid)?;
        let mut children: Vec<GroupId> = group
            .items
            .iter()
            .filter_map(|item| match item.payload {
                GroupPayload::Nested(child) => Some(child),
                GroupPayload::Leaf(_) => None,
            })
            .collect();
        children.sort();
        children.dedup();
        Ok(children)
    }

    fn sorted_parents(&self, gid: GroupId) -> Result<Vec<GroupId>> {
        let group = self.group(gid)?;
        let mut parents: Vec<GroupId> = group.parents.keys().copied().collect();
        parents.sort();
        Ok(parents)
    }

    /// Whether `to` is reachable from `from` through nested payloads.
    fn reaches(&self, from: GroupId, to: GroupId) -> Result<bool> {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(g) = stack.pop() {
            if g == to {
                return Ok(true);
            }
            if seen.insert(g) {
                stack.extend(self.nested_children(g)?);
            }
        }
        Ok(false)
    }

    fn natural_duration_seconds(&self, payload: &GroupPayload) -> Result<f64> {
        match payload {
            GroupPayload::Nested(child) => {
                let child = self.group(*child)?;
                Ok(child.duration / child.tempo.bps())
            }
            GroupPayload::Leaf(voice) => Ok(self
                .provider
                .as_ref()
                .and_then(|p| p.natural_duration(*voice))
                .unwrap_or(0.0)),
        }
    }

    fn item_end_beats(&self, group: &Group, item: &GroupItem) -> Result<f64> {
        let start = item.timing.start_beats(&group.tempo);
        let duration = match item.timing.duration_beats(&group.tempo) {
            Some(d) => d,
            None => match item.payload {
                // Nested durations already live in beat space; the
                // tempo recursion keeps child beats aligned with ours.
                GroupPayload::Nested(child) => self.group(child)?.duration,
                GroupPayload::Leaf(voice) => {
                    let natural = self
                        .provider
                        .as_ref()
                        .and_then(|p| p.natural_duration(voice))
                        .unwrap_or(0.0);
                    group.tempo.seconds_to_beats(natural)
                }
            },
        };
        Ok(start + duration)
    }

    fn refresh_local(&mut self, gid: GroupId) -> Result<()> {
        let group = self.group(gid)?;
        let mut ends: Vec<(usize, f64)> = Vec::with_capacity(group.items.len());
        for (index, item) in group.items.iter().enumerate() {
            ends.push((index, self.item_end_beats(group, item)?));
        }
        ends.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let duration = ends.first().map(|(_, end)| end.max(0.0)).unwrap_or(0.0);

        let group = self.group_mut(gid)?;
        group.by_end_desc = ends.into_iter().map(|(index, _)| index).collect();
        group.duration = duration;
        Ok(())
    }
}

impl Tick for GroupArena {
    fn next_deadline(&self) -> Option<f64> {
        if self.streaming {
            self.timers.next_deadline()
        } else {
            None
        }
    }

    fn poll(&mut self, now: f64) {
        while let Some((timer, gid)) = self.timers.pop_due(now) {
            if let Some(group) = self.groups.get_mut(&gid) {
                group.pending.retain(|t| *t != timer);
            }
            let mut on_group_ended = self.on_group_ended.take();
            if let Some(hook) = on_group_ended.as_mut() {
                hook(gid);
            }
            self.on_group_ended = on_group_ended;
        }
    }
}
