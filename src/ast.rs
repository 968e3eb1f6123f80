//! Syntax tree for the policy language.
//!
//! Nodes are built once by the parser in a single forward pass and are
//! immutable afterwards. Spans carry byte offsets into the original source
//! and exist only so the printer can recover comments; they have no
//! semantic weight.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// Represents a span in the source code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Anything the printer can anchor comments to.
pub trait Node {
    fn span(&self) -> Span;

    /// True when the node renders the trailing comments of its own members,
    /// so callers must not query a trailing comment for the node as a whole.
    fn has_inner_comments(&self) -> bool {
        false
    }
}

/// An IP prefix filter of an aggregate automatic group (`ip = A.B.C.D/n &`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpPrefix {
    pub addr: IpAddr,
    pub len: u8,
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

/// A named top-level definition of one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Toplevel {
    Group(Group),
    Service(Service),
}

impl Toplevel {
    /// The full typed name token, e.g. `group:g1` or `service:s1`.
    pub fn name(&self) -> &str {
        match self {
            Toplevel::Group(g) => &g.name,
            Toplevel::Service(s) => &s.name,
        }
    }

    pub fn description(&self) -> Option<&Description> {
        match self {
            Toplevel::Group(g) => g.description.as_ref(),
            Toplevel::Service(s) => s.description.as_ref(),
        }
    }

    /// List-shaped toplevels print as `name = <list>;`, block-shaped ones
    /// as `name = { ... }`.
    pub fn is_list(&self) -> bool {
        matches!(self, Toplevel::Group(_))
    }
}

impl Node for Toplevel {
    fn span(&self) -> Span {
        match self {
            Toplevel::Group(g) => g.span,
            Toplevel::Service(s) => s.span,
        }
    }
}

/// `group:NAME = <union>;` — the member list may be empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub name: String,
    pub description: Option<Description>,
    pub elements: Vec<Element>,
    pub span: Span,
    pub file: String,
}

/// `service:NAME = { ... }` with attributes, a user set and rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub name: String,
    pub description: Option<Description>,
    pub attributes: Vec<Attribute>,
    pub foreach: bool,
    pub user: Vec<Element>,
    pub rules: Vec<Rule>,
    pub span: Span,
    pub file: String,
}

/// A permit/deny rule of a service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub deny: bool,
    pub src: Vec<Element>,
    pub dst: Vec<Element>,
    pub prt: Vec<Protocol>,
    pub log: Option<Attribute>,
    pub span: Span,
}

impl Node for Rule {
    fn span(&self) -> Span {
        self.span
    }
}

/// A named attribute: bare flag (`multi_owner;`) or name/value list
/// (`overlaps = service:a, service:b;`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Value>,
    pub span: Span,
}

impl Node for Attribute {
    fn span(&self) -> Span {
        self.span
    }
}

/// An opaque attribute value token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Value {
    pub value: String,
    pub span: Span,
}

impl Node for Value {
    fn span(&self) -> Span {
        self.span
    }
}

/// Free-form single-line description text. The text is verbatim source,
/// trailing whitespace trimmed; `#` inside it is literal, not a comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub text: String,
    pub span: Span,
}

impl Node for Description {
    fn span(&self) -> Span {
        self.span
    }
}

/// A reference to, or set expression over, policy objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Element {
    /// Direct reference, e.g. `host:h1`.
    NamedRef {
        typ: String,
        name: String,
        span: Span,
    },
    /// `interface:router.network[.extension]`. When the network part is an
    /// `[auto|all]` selector, `network` holds `"["` and `extension` the
    /// selector keyword.
    IntfRef {
        typ: String,
        router: String,
        network: String,
        extension: String,
        span: Span,
    },
    /// The literal placeholder `user`.
    User { span: Span },
    /// `host:[...]` / `network:[...]` — membership computed from a nested
    /// element list.
    SimpleAuto {
        typ: String,
        elements: Vec<Element>,
        span: Span,
    },
    /// `any:[...]`, optionally filtered by an IP prefix.
    AggAuto {
        typ: String,
        net: Option<IpPrefix>,
        elements: Vec<Element>,
        span: Span,
    },
    /// `interface:[...].[auto|all]`, optionally filtered by `managed &`.
    IntfAuto {
        typ: String,
        managed: bool,
        selector: String,
        elements: Vec<Element>,
        span: Span,
    },
    /// Two or more elements combined with `&`/`&!`.
    Intersection { list: Vec<Element>, span: Span },
    /// A `!`-negated element.
    Complement { element: Box<Element>, span: Span },
}

impl Node for Element {
    fn span(&self) -> Span {
        use Element::*;
        match self {
            NamedRef { span, .. }
            | IntfRef { span, .. }
            | User { span }
            | SimpleAuto { span, .. }
            | AggAuto { span, .. }
            | IntfAuto { span, .. }
            | Intersection { span, .. }
            | Complement { span, .. } => *span,
        }
    }

    fn has_inner_comments(&self) -> bool {
        matches!(self, Element::Intersection { .. })
    }
}

/// A protocol entry of a rule's `prt` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Protocol {
    /// `protocol:NAME` or `protocolgroup:NAME`.
    Ref {
        typ: String,
        name: String,
        span: Span,
    },
    /// `tcp 80`, `udp 123`, `icmp 3/13`, `proto 50` — head keyword plus
    /// positional detail tokens.
    Simple {
        proto: String,
        details: Vec<String>,
        span: Span,
    },
}

impl Node for Protocol {
    fn span(&self) -> Span {
        match self {
            Protocol::Ref { span, .. } | Protocol::Simple { span, .. } => *span,
        }
    }
}
