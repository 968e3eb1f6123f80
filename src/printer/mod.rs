//! Canonical rendering of a parsed policy file.
//!
//! The printer merges two inputs: the syntax tree (fully re-sorted and
//! re-indented, one decision at a time) and the original source bytes, from
//! which user comments are recovered by position and re-attached to the
//! nodes they belong to. Rendering a structurally valid tree never fails,
//! and rendering the printer's own output reproduces it unchanged.

mod comment;
mod order;

use crate::ast::{Attribute, Element, Node, Protocol, Rule, Service, Toplevel, Value};

/// Render the canonical textual form of `list`, recovering comments from
/// the original source.
pub fn render(list: &[Toplevel], src: &str) -> String {
    let mut printer = Printer::new(src);
    for (i, toplevel) in list.iter().enumerate() {
        printer.toplevel(toplevel);
        // Empty line between toplevel definitions.
        if i != list.len() - 1 {
            printer.print("");
        }
    }
    printer.flush_tail(list);
    printer.out
}

struct Printer {
    /// Original source code with comments, newline-terminated.
    src: String,
    out: String,
    indent: usize,
}

impl Printer {
    fn new(src: &str) -> Self {
        let mut src = src.to_string();
        if !src.is_empty() && !src.ends_with('\n') {
            src.push('\n');
        }
        Printer {
            src,
            out: String::new(),
            indent: 0,
        }
    }

    fn print(&mut self, line: &str) {
        if !line.is_empty() {
            for _ in 0..self.indent {
                self.out.push(' ');
            }
            self.out.push_str(line);
        }
        self.out.push('\n');
    }

    /// Append a blank line unless one is already there.
    fn empty_line(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    // ------------------------------------------------------------------
    // Elements

    /// Single-line rendering for a nested list with exactly one bare member.
    fn short_form(l: &[&Element]) -> Option<String> {
        if l.len() != 1 {
            return None;
        }
        match l[0] {
            Element::NamedRef { typ, name, .. } => Some(format!("{typ}:{name}")),
            Element::User { .. } => Some("user".to_string()),
            _ => None,
        }
    }

    fn sub_elements(&mut self, p1: &str, p2: &str, l: &[Element], stop: &str) {
        let ordered = order::order_elements(l);
        if let Some(name) = Self::short_form(&ordered) {
            self.print(&format!("{p1}{p2}{name}{stop}"));
        } else {
            self.print(&format!("{p1}{p2}"));
            self.indent += p1.len();
            self.element_list(&ordered, stop);
            self.indent -= p1.len();
        }
    }

    fn element(&mut self, pre: &str, el: &Element, post: &str) {
        match el {
            Element::NamedRef { typ, name, .. } => {
                self.print(&format!("{pre}{typ}:{name}{post}"));
            }
            Element::User { .. } => self.print(&format!("{pre}user{post}")),
            Element::IntfRef {
                typ,
                router,
                network,
                extension,
                ..
            } => {
                let (net, ext) = if network == "[" {
                    (format!("[{extension}]"), String::new())
                } else if !extension.is_empty() {
                    (network.clone(), format!(".{extension}"))
                } else {
                    (network.clone(), String::new())
                };
                self.print(&format!("{pre}{typ}:{router}.{net}{ext}{post}"));
            }
            Element::SimpleAuto { typ, elements, .. } => {
                self.sub_elements(pre, &format!("{typ}:["), elements, &format!("]{post}"));
            }
            Element::AggAuto {
                typ, net, elements, ..
            } => {
                let mut p2 = format!("{typ}:[");
                if let Some(n) = net {
                    p2.push_str(&format!("ip = {n} & "));
                }
                self.sub_elements(pre, &p2, elements, &format!("]{post}"));
            }
            Element::IntfAuto {
                typ,
                managed,
                selector,
                elements,
                ..
            } => {
                let mut p2 = format!("{typ}:[");
                if *managed {
                    p2.push_str("managed & ");
                }
                let stop = format!("].[{selector}]{post}");
                self.sub_elements(pre, &p2, elements, &stop);
            }
            Element::Intersection { list, .. } => self.intersection(pre, list, post),
            Element::Complement { element, .. } => self.element("! ", element, post),
        }
    }

    /// First member on the `pre`-prefixed line, every further member on its
    /// own `&`/`&!` continuation line aligned under the prefix width, and
    /// the list's terminator on a standalone line.
    fn intersection(&mut self, pre: &str, list: &[Element], post: &str) {
        // First member already got its pre-comment from the union.
        let trail = self.trailing_comment(list[0].span(), "&!");
        self.element(pre, &list[0], &trail);
        self.indent += pre.len();
        for el in &list[1..] {
            let (pre2, inner) = match el {
                Element::Complement { element, .. } => ("&! ", element.as_ref()),
                _ => ("& ", el),
            };
            self.pre_comment(inner.span(), "&!");
            let trail = self.trailing_comment(inner.span(), "&!,;");
            self.element(pre2, inner, &trail);
        }
        self.print(post);
        self.indent -= pre.len();
    }

    fn element_list(&mut self, l: &[&Element], stop: &str) {
        self.indent += 1;
        for el in l {
            self.pre_comment(el.span(), ",");
            // An intersection prints its members' comments itself.
            let trail = if el.has_inner_comments() {
                String::new()
            } else {
                self.trailing_comment(el.span(), ",;")
            };
            self.element("", el, &format!(",{trail}"));
        }
        self.indent -= 1;
        self.print(stop);
    }

    // ------------------------------------------------------------------
    // Named lists

    /// `name = <first>` on one line; further members aligned under the
    /// first, the terminator on its own aligned line.
    fn named_list<T: Node>(
        &mut self,
        name: &str,
        l: &[&T],
        show: fn(&mut Self, &str, &T, &str),
    ) {
        if l.is_empty() {
            self.print(&format!("{name} = ;"));
            return;
        }
        let pre = format!("{name} = ");
        let first = l[0];
        let rest = &l[1..];
        let post = if rest.is_empty() { ";" } else { "," };
        let trail = if first.has_inner_comments() {
            String::new()
        } else {
            self.trailing_comment(first.span(), ",;")
        };
        show(self, &pre, first, &format!("{post}{trail}"));

        if !rest.is_empty() {
            self.indent += pre.len();
            for v in rest {
                self.pre_comment(v.span(), ",");
                let trail = if v.has_inner_comments() {
                    String::new()
                } else {
                    self.trailing_comment(v.span(), ",;")
                };
                show(self, "", v, &format!(",{trail}"));
            }
            self.print(";");
            self.indent -= pre.len();
        }
    }

    fn value(&mut self, pre: &str, v: &Value, post: &str) {
        self.print(&format!("{pre}{}{post}", v.value));
    }

    fn attribute(&mut self, a: &Attribute) {
        self.pre_comment(a.span(), "");
        if a.values.is_empty() {
            let trail = self.trailing_comment(a.span(), ",;");
            self.print(&format!("{};{trail}", a.name));
            return;
        }
        let values: Vec<&Value> = a.values.iter().collect();
        self.named_list(&a.name, &values, Self::value);
    }

    /// Protocols are flattened onto single lines; no nested layout.
    fn protocol(&mut self, pre: &str, el: &Protocol, post: &str) {
        let mut out = String::from(pre);
        match el {
            Protocol::Ref { typ, name, .. } => {
                out.push_str(&format!("{typ}:{name}"));
            }
            Protocol::Simple { proto, details, .. } => {
                out.push_str(proto);
                for d in details {
                    out.push(' ');
                    out.push_str(d);
                }
            }
        }
        self.print(&format!("{out}{post}"));
    }

    // ------------------------------------------------------------------
    // Toplevels

    fn rule(&mut self, r: &Rule) {
        self.pre_comment(r.span(), "");
        let action = if r.deny { "deny  " } else { "permit" };
        let ind = action.len() + 1;
        let src = order::order_elements(&r.src);
        self.named_list(&format!("{action} src"), &src, Self::element);
        self.indent += ind;
        let dst = order::order_elements(&r.dst);
        self.named_list("dst", &dst, Self::element);
        let prt = order::order_protocols(&r.prt);
        self.named_list("prt", &prt, Self::protocol);
        if let Some(log) = &r.log {
            self.attribute(log);
        }
        self.indent -= ind;
    }

    fn service(&mut self, s: &Service) {
        self.indent += 1;
        self.empty_line();
        for a in &s.attributes {
            self.attribute(a);
        }
        self.empty_line();
        let user = order::order_elements(&s.user);
        if s.foreach {
            self.print("user = foreach");
            self.element_list(&user, ";");
        } else {
            self.named_list("user", &user, Self::element);
        }
        for r in &s.rules {
            self.rule(r);
        }
        self.indent -= 1;
        self.print("}");
    }

    fn toplevel(&mut self, n: &Toplevel) {
        self.pre_comment(n.span(), "");
        let mut sep = String::from(" =");
        if !n.is_list() {
            sep.push_str(" {");
        }
        let pos = n.span().start + n.name().len();
        let trail = self.trailing_comment_at(pos, &sep);
        self.print(&format!("{}{sep}{trail}", n.name()));

        if let Some(d) = n.description() {
            self.indent += 1;
            self.pre_comment(d.span(), &sep);
            let trail = self.trailing_comment(d.span(), "=");
            self.print(&format!("description ={}{trail}", d.text));
            self.indent -= 1;
            self.empty_line();
        }

        match n {
            Toplevel::Group(g) => {
                let ordered = order::order_elements(&g.elements);
                self.element_list(&ordered, ";");
            }
            Toplevel::Service(s) => self.service(s),
        }
    }
}
