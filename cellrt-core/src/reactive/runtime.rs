//! Reactive Runtime
//!
//! The runtime owns the mounted component trees and drives the pass
//! pipeline that turns cell updates into evaluations, effects and frames.
//!
//! # How a Pass Works
//!
//! 1. Standard effects left over from the previous pass run first.
//!
//! 2. The scheduler is drained parents-first. Each dirty component is
//!    evaluated, then its children are reconciled against the view it
//!    returned:
//!    a. a child at the same position with the same name keeps its instance
//!    b. a kept plain child is always re-evaluated; a kept memoized child
//!    only if its props changed, a context it read changed, or it has its
//!    own pending update
//!    c. anything else is unmounted, and new children are mounted and
//!    evaluated
//!    d. if any child fails, the children mounted by this step are torn
//!    down and the previous ones are kept
//!
//! 3. Effects queued during evaluation are committed children before
//!    parents. Layout effects run now; if they scheduled updates the pass
//!    loops back to step 2.
//!
//! 4. A [`Frame`] is built from the tree and handed to the [`Presenter`].
//!
//! Standard effects wait for [`Runtime::tick`], which the caller drives
//! (or [`Runtime::flush`], which loops pass and tick until nothing is left).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::EvaluationContext;
use super::effect::{EffectPhase, EffectSlot};
use super::scope::Scope;
use super::shared::ContextEnv;
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::graph::{ComponentId, ComponentNode, UpdateScheduler};
use crate::view::{ComponentSpec, View};

/// Receives every presented frame. This is the renderer seam: a host
/// implementation would write the frame to its output.
pub trait Presenter {
    fn present(&mut self, frame: &Frame);
}

/// Presenter that discards frames.
#[derive(Debug, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _frame: &Frame) {}
}

impl<F: FnMut(&Frame)> Presenter for F {
    fn present(&mut self, frame: &Frame) {
        self(frame)
    }
}

/// Text output of the mounted trees, depth-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// One entry per text node, in tree order.
    pub lines: Vec<String>,
}

impl Frame {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether any line equals `line`.
    pub fn contains(&self, line: &str) -> bool {
        self.lines.iter().any(|candidate| candidate == line)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

/// What one [`Runtime::render_pass`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Evaluate/layout rounds within the pass.
    pub rounds: usize,
    /// Component evaluations.
    pub evaluated: usize,
    /// Layout effects run before the frame was presented.
    pub layout_effects: usize,
    /// Leftover standard effects run at the start of the pass.
    pub effects: usize,
}

/// What one [`Runtime::flush`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Render passes run, each followed by a tick.
    pub passes: usize,
    /// Component evaluations across all passes.
    pub evaluated: usize,
    /// Layout effects across all passes.
    pub layout_effects: usize,
    /// Standard effects, whether run by a pass or a tick.
    pub effects: usize,
}

/// The reactive runtime.
///
/// Single-threaded: handles created by a runtime's components are `!Send`.
pub struct Runtime {
    config: Rc<RuntimeConfig>,
    scheduler: Rc<RefCell<UpdateScheduler>>,
    roots: IndexMap<ComponentId, Rc<ComponentNode>>,
    layout_queue: VecDeque<Rc<EffectSlot>>,
    effect_queue: VecDeque<Rc<EffectSlot>>,
    presenter: Box<dyn Presenter>,
    passes: u64,
    frame: Frame,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config: Rc::new(config),
            scheduler: Rc::new(RefCell::new(UpdateScheduler::new())),
            roots: IndexMap::new(),
            layout_queue: VecDeque::new(),
            effect_queue: VecDeque::new(),
            presenter: Box::new(NullPresenter),
            passes: 0,
            frame: Frame::default(),
        }
    }

    /// Replace the presenter, builder style.
    pub fn with_presenter(mut self, presenter: impl Presenter + 'static) -> Self {
        self.presenter = Box::new(presenter);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Mount a root component. It is evaluated by the next pass.
    pub fn mount(&mut self, root: ComponentSpec) -> ComponentId {
        let node = ComponentNode::new(
            root,
            0,
            Rc::new(ContextEnv::default()),
            Rc::downgrade(&self.scheduler),
            Rc::clone(&self.config),
        );
        let id = node.id();
        tracing::debug!(component = %id, name = %node.name(), "mounted root");
        node.schedule_update();
        self.roots.insert(id, node);
        id
    }

    /// Unmount a root and its whole subtree, children first.
    pub fn unmount(&mut self, id: ComponentId) -> Result<()> {
        let root = self
            .roots
            .shift_remove(&id)
            .ok_or(RuntimeError::UnknownComponent { id })?;
        teardown(&root);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    /// Run one pass: leftover standard effects, evaluation of every
    /// scheduled component, layout effects, presentation.
    pub fn render_pass(&mut self) -> Result<PassReport> {
        let mut report = PassReport {
            effects: self.tick()?,
            ..PassReport::default()
        };
        let limit = self.config.max_passes;

        loop {
            let pending = self.scheduler.borrow().len();
            let dirty = self.scheduler.borrow_mut().take_ordered();
            // A failed pass can leave layout effects behind; they still run
            // (or are dropped, if their component went away) before presenting.
            if dirty.is_empty() && self.layout_queue.is_empty() {
                break;
            }
            if report.rounds >= limit {
                return Err(RuntimeError::UpdateDepthExceeded { limit });
            }
            report.rounds += 1;
            tracing::trace!(round = report.rounds, pending, "evaluation round");

            for node in dirty {
                // A parent evaluated earlier in this round may have
                // re-evaluated or unmounted it already.
                if node.is_mounted() && node.is_dirty() {
                    self.evaluate(&node, &mut report)?;
                }
            }
            report.layout_effects += self.run_layout_effects()?;
        }

        self.present();
        self.passes += 1;
        tracing::debug!(
            pass = self.passes,
            rounds = report.rounds,
            evaluated = report.evaluated,
            "pass presented"
        );
        Ok(report)
    }

    /// Run pending standard-phase effects. Returns how many ran.
    pub fn tick(&mut self) -> Result<usize> {
        let mut ran = 0;
        while let Some(effect) = self.effect_queue.pop_front() {
            if effect.is_pending() && effect.run()? {
                ran += 1;
            }
        }
        Ok(ran)
    }

    /// Alternate passes and ticks until no update or effect is pending.
    pub fn flush(&mut self) -> Result<FlushReport> {
        let limit = self.config.max_passes;
        let mut report = FlushReport::default();

        loop {
            if report.passes >= limit {
                return Err(RuntimeError::UpdateDepthExceeded { limit });
            }
            let pass = self.render_pass()?;
            let ticked = self.tick()?;

            report.passes += 1;
            report.evaluated += pass.evaluated;
            report.layout_effects += pass.layout_effects;
            report.effects += pass.effects + ticked;

            if self.is_idle() {
                return Ok(report);
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.scheduler.borrow().is_empty()
            && self.layout_queue.is_empty()
            && self.effect_queue.is_empty()
    }

    fn evaluate(&mut self, node: &Rc<ComponentNode>, report: &mut PassReport) -> Result<()> {
        let span = tracing::debug_span!(
            "evaluate",
            component = %node.id(),
            name = %node.name(),
            contexts = node.env().len()
        );
        let _entered = span.enter();

        self.scheduler.borrow_mut().remove(node.id());
        node.begin_evaluation();

        let render = node.render_fn();
        let scope = Scope::new(Rc::clone(node));
        let output = {
            let _guard = EvaluationContext::enter(node.id());
            render(&scope)
        };
        let view = match output {
            Ok(view) => view,
            Err(err) => {
                node.abort_evaluation();
                return Err(err);
            }
        };
        node.finish_evaluation()?;
        report.evaluated += 1;

        if let Err(err) = self.reconcile(node, &view, report) {
            node.abort_evaluation();
            return Err(err);
        }
        node.set_last_view(view);

        for effect in node.take_queued_effects() {
            match effect.phase() {
                EffectPhase::Layout => self.layout_queue.push_back(effect),
                EffectPhase::Standard => self.effect_queue.push_back(effect),
            }
        }
        Ok(())
    }

    /// Match the children described by `view` against `parent`'s current
    /// children.
    ///
    /// If a child fails, the children mounted here are torn down and the
    /// previous children are restored, so they keep matching the parent's
    /// last committed view.
    fn reconcile(
        &mut self,
        parent: &Rc<ComponentNode>,
        view: &View,
        report: &mut PassReport,
    ) -> Result<()> {
        let mut specs = Vec::new();
        view.collect_children(&parent.env(), &mut specs);

        let original = parent.take_children();
        let mut previous: Vec<Option<Rc<ComponentNode>>> =
            original.iter().cloned().map(Some).collect();
        let mut next = Vec::with_capacity(specs.len());
        let mut mounted = Vec::new();
        let mut outcome = Ok(());

        for (index, (spec, env)) in specs.into_iter().enumerate() {
            let reused = match previous.get_mut(index) {
                Some(slot) if slot.as_ref().is_some_and(|child| child.name() == spec.name()) => {
                    slot.take()
                }
                _ => None,
            };

            let step = match reused {
                Some(child) => {
                    let step = self.update_child(&child, spec, env, report);
                    next.push(child);
                    step
                }
                None => {
                    let child = ComponentNode::new(
                        spec,
                        parent.depth() + 1,
                        env,
                        Rc::downgrade(&self.scheduler),
                        Rc::clone(&self.config),
                    );
                    tracing::debug!(component = %child.id(), name = %child.name(), "mounted");
                    next.push(Rc::clone(&child));
                    mounted.push(Rc::clone(&child));
                    self.evaluate(&child, report)
                }
            };

            if let Err(err) = step {
                outcome = Err(err);
                break;
            }
        }

        match outcome {
            Ok(()) => {
                for child in previous.into_iter().flatten() {
                    teardown(&child);
                }
                parent.set_children(next);
                Ok(())
            }
            Err(err) => {
                for child in mounted {
                    teardown(&child);
                }
                parent.set_children(original);
                Err(err)
            }
        }
    }

    fn update_child(
        &mut self,
        child: &Rc<ComponentNode>,
        spec: ComponentSpec,
        env: Rc<ContextEnv>,
        report: &mut PassReport,
    ) -> Result<()> {
        let props_changed = spec.props_changed(&child.spec());
        let env_changed = !Rc::ptr_eq(&child.env(), &env);
        let context_changed = env_changed && child.reads_changed_context(&env);

        child.replace_spec(spec);
        child.set_env(env);

        if props_changed || context_changed || child.is_dirty() {
            self.evaluate(child, report)
        } else if env_changed {
            self.propagate_env(child, report)
        } else {
            Ok(())
        }
    }

    /// Hand a new environment down through a component that is not being
    /// re-evaluated, re-evaluating the descendants that read a changed
    /// context.
    fn propagate_env(&mut self, node: &Rc<ComponentNode>, report: &mut PassReport) -> Result<()> {
        let mut specs = Vec::new();
        node.last_view().collect_children(&node.env(), &mut specs);
        let children: Vec<Rc<ComponentNode>> = node.children().clone();

        for (child, (_, env)) in children.iter().zip(specs) {
            if Rc::ptr_eq(&child.env(), &env) {
                continue;
            }
            let context_changed = child.reads_changed_context(&env);
            child.set_env(env);
            if context_changed || child.is_dirty() {
                self.evaluate(child, report)?;
            } else {
                self.propagate_env(child, report)?;
            }
        }
        Ok(())
    }

    fn run_layout_effects(&mut self) -> Result<usize> {
        let mut ran = 0;
        while let Some(effect) = self.layout_queue.pop_front() {
            if effect.run()? {
                ran += 1;
            }
        }
        Ok(ran)
    }

    fn present(&mut self) {
        let mut lines = Vec::new();
        for root in self.roots.values() {
            collect_lines(root, &mut lines);
        }
        self.frame = Frame { lines };
        self.presenter.present(&self.frame);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The most recently presented frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Number of completed passes.
    pub fn pass_count(&self) -> u64 {
        self.passes
    }

    pub fn is_mounted(&self, id: ComponentId) -> bool {
        self.find(id).is_some_and(|node| node.is_mounted())
    }

    /// Completed evaluations of a mounted component.
    pub fn render_count(&self, id: ComponentId) -> Option<u64> {
        self.find(id).map(|node| node.render_count())
    }

    /// Whether a component has an update waiting for the next pass.
    pub fn is_scheduled(&self, id: ComponentId) -> bool {
        self.scheduler.borrow().contains(id)
    }

    /// Whether standard effects are waiting for [`Runtime::tick`].
    pub fn has_pending_effects(&self) -> bool {
        !self.effect_queue.is_empty()
    }

    fn find(&self, id: ComponentId) -> Option<Rc<ComponentNode>> {
        fn search(node: &Rc<ComponentNode>, id: ComponentId) -> Option<Rc<ComponentNode>> {
            if node.id() == id {
                return Some(Rc::clone(node));
            }
            node.children().iter().find_map(|child| search(child, id))
        }
        self.roots.values().find_map(|root| search(root, id))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        for (_, root) in self.roots.drain(..) {
            teardown(&root);
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("roots", &self.roots.len())
            .field("passes", &self.passes)
            .field("pending_effects", &self.effect_queue.len())
            .finish()
    }
}

/// Unmount a subtree, children first.
fn teardown(node: &Rc<ComponentNode>) {
    for child in node.take_children() {
        teardown(&child);
    }
    tracing::debug!(component = %node.id(), name = %node.name(), "unmounted");
    node.unmount();
}

fn collect_lines(node: &Rc<ComponentNode>, out: &mut Vec<String>) {
    let view = node.last_view();
    let children = node.children();
    let mut children = children.iter();
    walk_view(&view, &mut children, out);
}

fn walk_view(
    view: &View,
    children: &mut std::slice::Iter<'_, Rc<ComponentNode>>,
    out: &mut Vec<String>,
) {
    match view {
        View::Empty => {}
        View::Text(text) => out.push(text.clone()),
        View::List(items) => {
            for item in items {
                walk_view(item, children, out);
            }
        }
        View::Component(_) => {
            if let Some(child) = children.next() {
                collect_lines(child, out);
            }
        }
        View::Provider(provision) => walk_view(provision.subtree(), children, out),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn counted(name: &'static str, renders: Rc<Cell<u32>>, text: &'static str) -> ComponentSpec {
        ComponentSpec::memo(name, move |_| {
            renders.set(renders.get() + 1);
            Ok(View::text(text))
        })
    }

    #[test]
    fn mount_and_present() {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = frames.clone();
        let mut runtime =
            Runtime::new().with_presenter(move |frame: &Frame| sink.borrow_mut().push(frame.clone()));

        let root = runtime.mount(ComponentSpec::new("Hello", |_| Ok(View::text("hello"))));
        assert!(runtime.is_scheduled(root));

        let report = runtime.render_pass().unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(runtime.frame().lines(), ["hello"]);
        assert_eq!(frames.borrow().len(), 1);
        assert_eq!(runtime.render_count(root), Some(1));
    }

    #[test]
    fn memoized_children_without_changes_are_not_re_evaluated() {
        let child_renders = Rc::new(Cell::new(0));
        let setter = Rc::new(RefCell::new(None));

        let renders = child_renders.clone();
        let out = setter.clone();
        let mut runtime = Runtime::new();
        runtime.mount(ComponentSpec::new("Parent", move |scope| {
            let (count, set) = scope.declare_cell(0)?;
            *out.borrow_mut() = Some(set);
            Ok(View::list([
                View::text(format!("count {count}")),
                counted("Static", renders.clone(), "static").into(),
            ]))
        }));
        runtime.flush().unwrap();
        assert_eq!(child_renders.get(), 1);

        let set = setter.borrow().clone().unwrap();
        set.set(1).unwrap();
        runtime.flush().unwrap();

        assert_eq!(child_renders.get(), 1);
        assert_eq!(runtime.frame().lines(), ["count 1", "static"]);
    }

    #[test]
    fn plain_children_follow_their_parent() {
        let child_renders = Rc::new(Cell::new(0));
        let setter = Rc::new(RefCell::new(None));

        let renders = child_renders.clone();
        let out = setter.clone();
        let mut runtime = Runtime::new();
        runtime.mount(ComponentSpec::new("Parent", move |scope| {
            let (count, set) = scope.declare_cell(0)?;
            *out.borrow_mut() = Some(set);
            let renders = renders.clone();
            Ok(ComponentSpec::new("Label", move |_| {
                renders.set(renders.get() + 1);
                Ok(View::text(format!("label {count}")))
            })
            .into())
        }));
        runtime.flush().unwrap();

        let set = setter.borrow().clone().unwrap();
        set.set(5).unwrap();
        runtime.flush().unwrap();

        assert_eq!(child_renders.get(), 2);
        assert_eq!(runtime.frame().lines(), ["label 5"]);
    }

    #[test]
    fn failed_reconcile_keeps_the_previous_children() {
        let broken = Rc::new(Cell::new(false));
        let flag = broken.clone();
        let setter = Rc::new(RefCell::new(None));
        let out = setter.clone();

        let mut runtime = Runtime::new();
        let root = runtime.mount(ComponentSpec::new("Switch", move |scope| {
            let (_, set) = scope.declare_cell(0)?;
            *out.borrow_mut() = Some(set);
            if flag.get() {
                Ok(View::list([
                    ComponentSpec::new("A", |_| Ok(View::text("a"))).into(),
                    ComponentSpec::new("B", |_| Err(RuntimeError::action("cannot render")))
                        .into(),
                ]))
            } else {
                Ok(ComponentSpec::new("X", |_| Ok(View::text("x"))).into())
            }
        }));
        runtime.flush().unwrap();
        let x = runtime.roots[&root].children()[0].id();

        broken.set(true);
        let set = setter.borrow().clone().unwrap();
        set.update(|n| n + 1).unwrap();
        assert!(runtime.flush().is_err());

        let children: Vec<_> = runtime.roots[&root]
            .children()
            .iter()
            .map(|child| child.id())
            .collect();
        assert_eq!(children, vec![x]);
        assert!(runtime.is_mounted(x));
        runtime.render_pass().unwrap();
        assert_eq!(runtime.frame().lines(), ["x"]);
    }

    #[test]
    fn replaced_children_are_unmounted() {
        let show = Rc::new(Cell::new(true));
        let toggle = show.clone();
        let setter = Rc::new(RefCell::new(None));
        let out = setter.clone();

        let mut runtime = Runtime::new();
        runtime.mount(ComponentSpec::new("Switch", move |scope| {
            let (_, set) = scope.declare_cell(0)?;
            *out.borrow_mut() = Some(set);
            let child = if toggle.get() {
                ComponentSpec::new("A", |_| Ok(View::text("a")))
            } else {
                ComponentSpec::new("B", |_| Ok(View::text("b")))
            };
            Ok(child.into())
        }));
        runtime.flush().unwrap();
        assert_eq!(runtime.frame().lines(), ["a"]);

        show.set(false);
        let set = setter.borrow().clone().unwrap();
        set.update(|n| n + 1).unwrap();
        runtime.flush().unwrap();
        assert_eq!(runtime.frame().lines(), ["b"]);
    }

    #[test]
    fn unknown_root_is_reported() {
        let mut runtime = Runtime::new();
        let id = ComponentId::new();
        assert!(matches!(
            runtime.unmount(id),
            Err(RuntimeError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn render_errors_abort_the_pass() {
        let mut runtime = Runtime::new();
        runtime.mount(ComponentSpec::new("Broken", |_| {
            Err(RuntimeError::action("cannot render"))
        }));
        assert!(runtime.render_pass().is_err());
        assert_eq!(runtime.pass_count(), 0);
    }
}
