//! View Description
//!
//! A render function returns a [`View`]: text, lists, child components and
//! context providers. The runtime walks it to find the component's children
//! and, after layout effects, to build the presented [`Frame`].
//!
//! [`Frame`]: crate::reactive::Frame

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::reactive::shared::{ContextEnv, ContextId, ProvidedValue, SameFn};
use crate::reactive::Scope;

/// Render function of a component.
pub type RenderFn = Rc<dyn Fn(&Scope) -> Result<View>>;

/// Output of one component evaluation.
#[derive(Clone, Default)]
pub enum View {
    #[default]
    Empty,
    Text(String),
    List(Vec<View>),
    Component(ComponentSpec),
    Provider(Provision),
}

impl View {
    pub fn text(text: impl Into<String>) -> Self {
        View::Text(text.into())
    }

    pub fn list(items: impl IntoIterator<Item = View>) -> Self {
        View::List(items.into_iter().collect())
    }

    /// Visit child component specs in order, with the context environment
    /// each of them will be rendered in.
    pub(crate) fn collect_children(
        &self,
        env: &Rc<ContextEnv>,
        out: &mut Vec<(ComponentSpec, Rc<ContextEnv>)>,
    ) {
        match self {
            View::Empty | View::Text(_) => {}
            View::List(items) => {
                for item in items {
                    item.collect_children(env, out);
                }
            }
            View::Component(spec) => out.push((spec.clone(), Rc::clone(env))),
            View::Provider(provision) => {
                let inner = Rc::new(env.with_value(provision.context, provision.value.clone()));
                provision.subtree.collect_children(&inner, out);
            }
        }
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        View::Text(text.to_string())
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        View::Text(text)
    }
}

impl From<Vec<View>> for View {
    fn from(items: Vec<View>) -> Self {
        View::List(items)
    }
}

impl From<ComponentSpec> for View {
    fn from(spec: ComponentSpec) -> Self {
        View::Component(spec)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Empty => f.write_str("Empty"),
            View::Text(text) => f.debug_tuple("Text").field(text).finish(),
            View::List(items) => f.debug_tuple("List").field(items).finish(),
            View::Component(spec) => f.debug_tuple("Component").field(spec).finish(),
            View::Provider(provision) => f.debug_tuple("Provider").field(provision).finish(),
        }
    }
}

/// A subtree rendered with one shared context bound to a value.
///
/// Built by [`Scope::provide_context`].
#[derive(Clone)]
pub struct Provision {
    context: ContextId,
    value: ProvidedValue,
    subtree: Box<View>,
}

impl Provision {
    pub(crate) fn new(context: ContextId, value: ProvidedValue, subtree: View) -> Self {
        Self {
            context,
            value,
            subtree: Box::new(subtree),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn subtree(&self) -> &View {
        &self.subtree
    }
}

impl fmt::Debug for Provision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provision")
            .field("context", &self.context)
            .field("provider", &self.value.provider)
            .field("subtree", &self.subtree)
            .finish()
    }
}

#[derive(Clone)]
struct Props {
    value: Rc<dyn Any>,
    same: SameFn,
}

/// Description of a child component: a name, a render function and
/// optional props.
///
/// The name identifies the component kind during reconciliation: a child at
/// the same position with the same name keeps its instance and state.
///
/// A plain child ([`ComponentSpec::new`]) is re-evaluated whenever its parent
/// is. A memoized child ([`ComponentSpec::memo`], [`ComponentSpec::with_props`])
/// is skipped while its props are equal to the previous ones, unless a
/// context it read changed or it has its own pending update.
#[derive(Clone)]
pub struct ComponentSpec {
    name: Cow<'static, str>,
    render: RenderFn,
    props: Option<Props>,
}

impl ComponentSpec {
    /// A component without props.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        render: impl Fn(&Scope) -> Result<View> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(render),
            props: None,
        }
    }

    /// A memoized component without props: its parent never re-evaluates
    /// it, only its own updates and context changes do.
    pub fn memo(
        name: impl Into<Cow<'static, str>>,
        render: impl Fn(&Scope) -> Result<View> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(render),
            props: Some(Props {
                value: Rc::new(()),
                same: crate::reactive::shared::same_value::<()>,
            }),
        }
    }

    /// A memoized component that receives `props`. It is re-evaluated by its
    /// parent only when the props differ from the previous ones.
    pub fn with_props<P: PartialEq + 'static>(
        name: impl Into<Cow<'static, str>>,
        props: P,
        render: impl Fn(&Scope, &P) -> Result<View> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(move |scope: &Scope| {
                let props = scope.props::<P>()?;
                render(scope, &*props)
            }),
            props: Some(Props {
                value: Rc::new(props),
                same: crate::reactive::shared::same_value::<P>,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn render_fn(&self) -> RenderFn {
        Rc::clone(&self.render)
    }

    pub(crate) fn props_value(&self) -> Option<Rc<dyn Any>> {
        self.props.as_ref().map(|props| Rc::clone(&props.value))
    }

    /// Whether a parent re-evaluation must re-evaluate this child, given the
    /// spec it was last rendered from. Only two memoized specs with equal
    /// props can be skipped.
    pub(crate) fn props_changed(&self, previous: &ComponentSpec) -> bool {
        match (&self.props, &previous.props) {
            (Some(next), Some(prev)) => {
                !(Rc::ptr_eq(&next.value, &prev.value)
                    || (next.same)(next.value.as_ref(), prev.value.as_ref()))
            }
            _ => true,
        }
    }
}

impl fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("name", &self.name)
            .field("has_props", &self.props.is_some())
            .finish()
    }
}
