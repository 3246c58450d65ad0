//! Frame arena.
//!
//! [`FrameTree`] owns every [`Frame`] and [`ExecutionContext`] by ID. Parent
//! and child links are IDs into the same table, so detaching a subtree is
//! "remove from the table", never a pointer teardown.
//!
//! The tree is a plain state machine: each method applies one protocol event
//! and reports what changed. It performs no I/O.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::{FxHashMap, FxHashSet};

use crate::identifiers::{ExecutionContextId, FrameId, LoaderId};
use crate::protocol::event::{ExecutionContextDescription, FramePayload, FrameTree as FrameTreePayload};

/// Name of the isolated world created in every frame.
pub const UTILITY_WORLD: &str = "__cdp_session_utility_world__";

// ============================================================================
// ExecutionContext
// ============================================================================

/// Scripting world of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum World {
    /// The page's own world.
    Main,
    /// The utility isolated world.
    Isolated,
}

/// A scripting realm inside a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Context ID.
    pub id: ExecutionContextId,
    /// Owning frame.
    pub frame_id: FrameId,
    /// World kind.
    pub world: World,
}

// ============================================================================
// Frame
// ============================================================================

/// Snapshot of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: FrameId,
    parent_id: Option<FrameId>,
    child_ids: Vec<FrameId>,
    url: String,
    name: Option<String>,
    loader_id: Option<LoaderId>,
    generation: u64,
    same_document_navigations: u64,
    lifecycle: FxHashSet<String>,
    main_world: Option<ExecutionContextId>,
    utility_world: Option<ExecutionContextId>,
}

impl Frame {
    fn new(id: FrameId, parent_id: Option<FrameId>) -> Self {
        Self {
            id,
            parent_id,
            child_ids: Vec::new(),
            url: String::new(),
            name: None,
            loader_id: None,
            generation: 0,
            same_document_navigations: 0,
            lifecycle: FxHashSet::default(),
            main_world: None,
            utility_world: None,
        }
    }

    /// Frame ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &FrameId {
        &self.id
    }

    /// Parent frame; `None` for the main frame.
    #[inline]
    #[must_use]
    pub fn parent_id(&self) -> Option<&FrameId> {
        self.parent_id.as_ref()
    }

    /// Returns `true` for the main frame.
    #[inline]
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Child frames in attach order.
    #[inline]
    #[must_use]
    pub fn child_ids(&self) -> &[FrameId] {
        &self.child_ids
    }

    /// Current URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Frame name attribute.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Loader of the current document.
    #[inline]
    #[must_use]
    pub fn loader_id(&self) -> Option<&LoaderId> {
        self.loader_id.as_ref()
    }

    /// Navigation generation; advances on every committed document.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of same-document navigations observed.
    #[inline]
    #[must_use]
    pub fn same_document_navigations(&self) -> u64 {
        self.same_document_navigations
    }

    /// Returns `true` if lifecycle event `name` fired for the current document.
    #[inline]
    #[must_use]
    pub fn has_lifecycle_event(&self, name: &str) -> bool {
        self.lifecycle.contains(name)
    }

    /// Lifecycle events fired for the current document, sorted.
    #[must_use]
    pub fn lifecycle_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.lifecycle.iter().cloned().collect();
        events.sort();
        events
    }

    /// Context of the main world, once created.
    #[inline]
    #[must_use]
    pub fn main_world(&self) -> Option<ExecutionContextId> {
        self.main_world
    }

    /// Context of the utility world, once created.
    #[inline]
    #[must_use]
    pub fn utility_world(&self) -> Option<ExecutionContextId> {
        self.utility_world
    }

    /// Context of `world`, once created.
    #[inline]
    #[must_use]
    pub fn context(&self, world: World) -> Option<ExecutionContextId> {
        match world {
            World::Main => self.main_world,
            World::Isolated => self.utility_world,
        }
    }

    fn set_context(&mut self, world: World, id: Option<ExecutionContextId>) {
        match world {
            World::Main => self.main_world = id,
            World::Isolated => self.utility_world = id,
        }
    }
}

// ============================================================================
// Effects
// ============================================================================

/// What a committed navigation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigated {
    /// Frame that navigated (after any re-anchoring).
    pub frame_id: FrameId,
    /// Previous ID when the main frame was re-anchored.
    pub previous_id: Option<FrameId>,
    /// Frames detached because their parent navigated.
    pub detached: Vec<FrameId>,
    /// Execution contexts invalidated by the navigation.
    pub destroyed_contexts: Vec<ExecutionContextId>,
}

/// What a detach removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detached {
    /// Removed frames, descendants first.
    pub frames: Vec<FrameId>,
    /// Execution contexts of the removed frames.
    pub contexts: Vec<ExecutionContextId>,
}

// ============================================================================
// FrameTree
// ============================================================================

/// Frames and execution contexts of one session, indexed by ID.
#[derive(Debug, Default)]
pub struct FrameTree {
    frames: FxHashMap<FrameId, Frame>,
    contexts: FxHashMap<ExecutionContextId, ExecutionContext>,
    main: Option<FrameId>,
    /// Former main frame IDs, pointing at the ID they were re-anchored to.
    aliases: FxHashMap<FrameId, FrameId>,
}

impl FrameTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of frames.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if the tree holds no frame.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// ID of the main frame.
    #[inline]
    #[must_use]
    pub fn main_frame_id(&self) -> Option<&FrameId> {
        self.main.as_ref()
    }

    /// Follows re-anchoring so a watcher keeps tracking the main frame
    /// across cross-process navigations.
    #[must_use]
    pub fn resolve<'a>(&'a self, id: &'a FrameId) -> &'a FrameId {
        let mut current = id;
        while let Some(next) = self.aliases.get(current) {
            current = next;
        }
        current
    }

    /// Looks up a frame, following re-anchoring.
    #[must_use]
    pub fn get(&self, id: &FrameId) -> Option<&Frame> {
        self.frames.get(self.resolve(id))
    }

    /// The main frame.
    #[must_use]
    pub fn main_frame(&self) -> Option<&Frame> {
        self.main.as_ref().and_then(|id| self.frames.get(id))
    }

    /// Every frame, main frame first, then depth-first in attach order.
    #[must_use]
    pub fn frames(&self) -> Vec<&Frame> {
        let mut out = Vec::with_capacity(self.frames.len());
        let mut stack: Vec<&FrameId> = self.main.iter().collect();
        while let Some(id) = stack.pop() {
            if let Some(frame) = self.frames.get(id) {
                out.push(frame);
                stack.extend(frame.child_ids.iter().rev());
            }
        }
        out
    }

    /// Looks up an execution context.
    #[must_use]
    pub fn context(&self, id: ExecutionContextId) -> Option<&ExecutionContext> {
        self.contexts.get(&id)
    }

    /// Returns `true` if every named lifecycle event fired for `id` and all
    /// of its descendants.
    #[must_use]
    pub fn lifecycle_complete(&self, id: &FrameId, events: &[&str]) -> bool {
        let Some(frame) = self.get(id) else {
            return false;
        };
        events.iter().all(|name| frame.lifecycle.contains(*name))
            && frame
                .child_ids
                .iter()
                .all(|child| self.lifecycle_complete(child, events))
    }

    // ========================================================================
    // Frame Events
    // ========================================================================

    /// Loads a `Page.getFrameTree` snapshot.
    pub fn load(&mut self, tree: &FrameTreePayload) {
        if let Some(parent) = &tree.frame.parent_id {
            self.attach(tree.frame.id.clone(), parent.clone());
        }
        self.navigated(&tree.frame);
        for child in &tree.child_frames {
            self.load(child);
        }
    }

    /// Inserts `id` under `parent_id`.
    ///
    /// Returns `false` for an already known frame or an unknown parent.
    pub fn attach(&mut self, id: FrameId, parent_id: FrameId) -> bool {
        if self.frames.contains_key(&id) {
            return false;
        }
        let parent_id = self.resolve(&parent_id).clone();
        let Some(parent) = self.frames.get_mut(&parent_id) else {
            return false;
        };
        parent.child_ids.push(id.clone());
        self.frames.insert(id.clone(), Frame::new(id, Some(parent_id)));
        true
    }

    /// Commits a new document in a frame.
    ///
    /// Child frames are detached, execution contexts invalidated, the
    /// lifecycle set cleared and the generation advanced. A main-frame
    /// navigation under a new ID re-anchors the main frame. Returns `None`
    /// for an unknown child frame.
    pub fn navigated(&mut self, payload: &FramePayload) -> Option<Navigated> {
        let is_main = payload.parent_id.is_none();
        let mut previous_id = None;
        let mut destroyed_contexts = Vec::new();

        if is_main {
            match self.main.clone() {
                Some(main) if main != payload.id => {
                    let Some(mut frame) = self.frames.remove(&main) else {
                        return None;
                    };
                    frame.id = payload.id.clone();
                    for child in &frame.child_ids {
                        if let Some(child) = self.frames.get_mut(child) {
                            child.parent_id = Some(payload.id.clone());
                        }
                    }
                    self.frames.insert(payload.id.clone(), frame);
                    self.aliases.insert(main.clone(), payload.id.clone());
                    self.aliases.remove(&payload.id);
                    self.main = Some(payload.id.clone());
                    destroyed_contexts.extend(self.remove_contexts_of(&main));
                    previous_id = Some(main);
                }
                Some(_) => {}
                None => {
                    self.frames
                        .insert(payload.id.clone(), Frame::new(payload.id.clone(), None));
                    self.main = Some(payload.id.clone());
                }
            }
        } else if !self.frames.contains_key(&payload.id) {
            return None;
        }

        let children = self
            .frames
            .get(&payload.id)
            .map(|frame| frame.child_ids.clone())
            .unwrap_or_default();
        let mut detached = Detached::default();
        for child in &children {
            let removed = self.detach(child);
            detached.frames.extend(removed.frames);
            detached.contexts.extend(removed.contexts);
        }

        destroyed_contexts.extend(detached.contexts);
        destroyed_contexts.extend(self.remove_contexts_of(&payload.id));

        let frame = self.frames.get_mut(&payload.id)?;
        frame.url = payload.full_url();
        frame.name = payload.name.clone();
        frame.loader_id = Some(payload.loader_id.clone());
        frame.generation += 1;
        frame.lifecycle.clear();

        Some(Navigated {
            frame_id: payload.id.clone(),
            previous_id,
            detached: detached.frames,
            destroyed_contexts,
        })
    }

    /// Applies a same-document navigation. Returns `false` for an unknown frame.
    pub fn navigated_within_document(&mut self, id: &FrameId, url: &str) -> bool {
        let id = self.resolve(id).clone();
        let Some(frame) = self.frames.get_mut(&id) else {
            return false;
        };
        frame.url = url.to_string();
        frame.same_document_navigations += 1;
        true
    }

    /// Removes `id` and all descendants along with their contexts.
    pub fn detach(&mut self, id: &FrameId) -> Detached {
        let id = self.resolve(id).clone();
        let mut out = Detached::default();
        self.detach_recursive(&id, &mut out);

        if let Some(parent_id) = self.frames.get(&id).and_then(|f| f.parent_id.clone())
            && let Some(parent) = self.frames.get_mut(&parent_id)
        {
            parent.child_ids.retain(|child| *child != id);
        }
        if let Some(frame) = self.frames.remove(&id) {
            out.contexts.extend(self.remove_contexts_of(&frame.id));
            out.frames.push(frame.id);
        }
        if self.main.as_ref() == Some(&id) {
            self.main = None;
        }
        self.aliases.retain(|_, target| *target != id);
        out
    }

    fn detach_recursive(&mut self, id: &FrameId, out: &mut Detached) {
        let children = self
            .frames
            .get(id)
            .map(|frame| frame.child_ids.clone())
            .unwrap_or_default();
        for child in &children {
            self.detach_recursive(child, out);
            if let Some(frame) = self.frames.remove(child) {
                out.contexts.extend(self.remove_contexts_of(&frame.id));
                out.frames.push(frame.id);
            }
        }
        if let Some(frame) = self.frames.get_mut(id) {
            frame.child_ids.clear();
        }
    }

    /// Records a lifecycle event.
    ///
    /// `init` starts a new loader and clears the set; any other event is
    /// ignored unless it belongs to the frame's current loader. Returns
    /// `true` if the set changed.
    pub fn lifecycle_event(&mut self, id: &FrameId, loader_id: &LoaderId, name: &str) -> bool {
        let id = self.resolve(id).clone();
        let Some(frame) = self.frames.get_mut(&id) else {
            return false;
        };
        if name == "init" {
            frame.loader_id = Some(loader_id.clone());
            frame.lifecycle.clear();
            return true;
        }
        if frame.loader_id.as_ref() != Some(loader_id) {
            return false;
        }
        frame.lifecycle.insert(name.to_string())
    }

    /// Marks a frame that stopped loading as loaded.
    pub fn stopped_loading(&mut self, id: &FrameId) -> bool {
        let id = self.resolve(id).clone();
        let Some(frame) = self.frames.get_mut(&id) else {
            return false;
        };
        let dom = frame.lifecycle.insert("DOMContentLoaded".to_string());
        let load = frame.lifecycle.insert("load".to_string());
        dom || load
    }

    // ========================================================================
    // Execution Contexts
    // ========================================================================

    /// Registers a created context. Returns `None` when the context belongs
    /// to no known frame or to a world that is not tracked.
    pub fn context_created(&mut self, description: &ExecutionContextDescription) -> Option<ExecutionContext> {
        let aux = description.aux_data.as_ref()?;
        let frame_id = self.resolve(aux.frame_id.as_ref()?).clone();

        let world = if aux.is_default {
            World::Main
        } else if description.name == UTILITY_WORLD {
            World::Isolated
        } else {
            return None;
        };

        let frame = self.frames.get_mut(&frame_id)?;
        if let Some(previous) = frame.context(world) {
            self.contexts.remove(&previous);
        }
        let frame = self.frames.get_mut(&frame_id)?;
        frame.set_context(world, Some(description.id));

        let context = ExecutionContext {
            id: description.id,
            frame_id,
            world,
        };
        self.contexts.insert(description.id, context.clone());
        Some(context)
    }

    /// Removes a destroyed context.
    pub fn context_destroyed(&mut self, id: ExecutionContextId) -> Option<ExecutionContext> {
        let context = self.contexts.remove(&id)?;
        if let Some(frame) = self.frames.get_mut(&context.frame_id)
            && frame.context(context.world) == Some(id)
        {
            frame.set_context(context.world, None);
        }
        Some(context)
    }

    /// Removes every context.
    pub fn contexts_cleared(&mut self) -> Vec<ExecutionContextId> {
        for frame in self.frames.values_mut() {
            frame.main_world = None;
            frame.utility_world = None;
        }
        self.contexts.drain().map(|(id, _)| id).collect()
    }

    fn remove_contexts_of(&mut self, frame_id: &FrameId) -> Vec<ExecutionContextId> {
        let ids: Vec<ExecutionContextId> = self
            .contexts
            .values()
            .filter(|context| context.frame_id == *frame_id)
            .map(|context| context.id)
            .collect();
        for id in &ids {
            self.contexts.remove(id);
        }
        if let Some(frame) = self.frames.get_mut(frame_id) {
            frame.main_world = None;
            frame.utility_world = None;
        }
        ids
    }
}

// ============================================================================
// Tests
// ============================================================================
