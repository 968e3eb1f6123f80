//! Recursive-descent parser for policy source files.
//!
//! One forward pass with single-token lookahead builds the syntax tree;
//! grammar-shape validation of names happens inline. Parsing is fail-fast:
//! the first malformed construct aborts the whole file with one diagnostic
//! and no partial tree.

use std::net::IpAddr;

use crate::ast::{
    Attribute, Description, Element, Group, IpPrefix, Protocol, Rule, Service, Span, Toplevel,
    Value,
};
use crate::errors::PolicyError;
use crate::scanner::Scanner;

/// Parse one source file into its list of toplevel definitions.
pub fn parse_file(src: &str, file: &str) -> Result<Vec<Toplevel>, PolicyError> {
    let mut parser = Parser::new(src, file);
    parser.file()
}

struct Parser<'s> {
    scanner: Scanner<'s>,
    file: &'s str,

    // One token look-ahead.
    pos: usize,
    tok: &'s str,
    // End offset of the token consumed before the look-ahead.
    prev_end: usize,
}

// ----------------------------------------------------------------------------
// Parsing support

impl<'s> Parser<'s> {
    fn new(src: &'s str, file: &'s str) -> Self {
        let mut p = Parser {
            scanner: Scanner::new(src, file),
            file,
            pos: 0,
            tok: "",
            prev_end: 0,
        };
        p.next();
        p
    }

    /// Advance to the next token.
    fn next(&mut self) {
        self.prev_end = self.scanner.offset();
        let (pos, tok) = self.scanner.token();
        self.pos = pos;
        self.tok = tok;
    }

    fn err<T>(&self, expectation: &str) -> Result<T, PolicyError> {
        Err(self.scanner.syntax_err(expectation))
    }

    fn expect(&mut self, tok: &str) -> Result<usize, PolicyError> {
        let pos = self.pos;
        if self.tok != tok {
            return self.err(&format!("Expected '{tok}'"));
        }
        self.next();
        Ok(pos)
    }

    fn check(&mut self, tok: &str) -> bool {
        if self.tok != tok {
            return false;
        }
        self.next();
        true
    }

    /// Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: usize) -> Span {
        Span {
            start,
            end: self.prev_end,
        }
    }
}

// ----------------------------------------------------------------------------
// Name shapes

fn is_simple_name(n: &str) -> bool {
    !n.is_empty() && !n.contains(['.', ':', '/', '@'])
}

fn is_domain(n: &str) -> bool {
    !n.is_empty() && n.split('.').all(is_simple_name)
}

fn is_network_name(n: &str) -> bool {
    match n.find('/') {
        Some(i) => is_simple_name(&n[..i]) && is_simple_name(&n[i + 1..]),
        None => is_simple_name(n),
    }
}

fn is_router_name(n: &str) -> bool {
    match n.find('@') {
        Some(i) => is_simple_name(&n[..i]) && is_simple_name(&n[i + 1..]),
        None => is_simple_name(n),
    }
}

impl<'s> Parser<'s> {
    fn verify_hostname(&self, name: &str) -> Result<(), PolicyError> {
        let bad = if let Some(id) = name.strip_prefix("id:") {
            match id.find('@') {
                // Leading "@" is ok.
                Some(i) => (i > 0 && !is_domain(&id[..i])) || !is_domain(&id[i + 1..]),
                None => !is_domain(id),
            }
        } else {
            !is_simple_name(name)
        };
        if bad {
            return self.err("Hostname expected");
        }
        Ok(())
    }

    fn verify_network_name(&self, n: &str) -> Result<(), PolicyError> {
        if !is_network_name(n) {
            return self.err("Name or bridged name expected");
        }
        Ok(())
    }

    fn verify_simple_name(&self, n: &str) -> Result<(), PolicyError> {
        if !is_simple_name(n) {
            return self.err("Name expected");
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Elements

impl<'s> Parser<'s> {
    /// Split the current token at the first `:` without consuming it.
    fn typed_name(&self) -> Result<(&'s str, &'s str), PolicyError> {
        match self.tok.find(':') {
            Some(i) => Ok((&self.tok[..i], &self.tok[i + 1..])),
            None => self.err("Typed name expected"),
        }
    }

    fn object_ref(&mut self, typ: &str, name: &str) -> Element {
        let start = self.pos;
        self.next();
        Element::NamedRef {
            typ: typ.to_string(),
            name: name.to_string(),
            span: self.span_from(start),
        }
    }

    fn host_ref(&mut self, typ: &str, name: &str) -> Result<Element, PolicyError> {
        self.verify_hostname(name)?;
        Ok(self.object_ref(typ, name))
    }

    fn network_ref(&mut self, typ: &str, name: &str) -> Result<Element, PolicyError> {
        self.verify_network_name(name)?;
        Ok(self.object_ref(typ, name))
    }

    fn simple_ref(&mut self, typ: &str, name: &str) -> Result<Element, PolicyError> {
        self.verify_simple_name(name)?;
        Ok(self.object_ref(typ, name))
    }

    /// `auto` or `all`, followed by the closing `]`.
    fn selector(&mut self) -> Result<String, PolicyError> {
        let result = self.tok;
        if !(result == "auto" || result == "all") {
            return self.err("Expected [auto|all]");
        }
        self.next();
        self.expect("]")?;
        Ok(result.to_string())
    }

    fn intf_ref(&mut self, typ: &str, name: &str) -> Result<Element, PolicyError> {
        let Some(i) = name.find('.') else {
            return self.err("Interface name expected");
        };
        let router = &name[..i];
        let mut net = &name[i + 1..];
        let mut bad = !is_router_name(router);
        let start = self.pos;
        self.next();
        let ext;
        if net == "[" {
            ext = self.selector()?;
        } else {
            match net.find('.') {
                Some(i) => {
                    let e = &net[i + 1..];
                    bad = bad || !is_simple_name(e);
                    net = &net[..i];
                    ext = e.to_string();
                }
                None => ext = String::new(),
            }
            bad = bad || !is_network_name(net);
        }
        if bad {
            return self.err("Interface name expected");
        }
        Ok(Element::IntfRef {
            typ: typ.to_string(),
            router: router.to_string(),
            network: net.to_string(),
            extension: ext,
            span: self.span_from(start),
        })
    }

    fn simple_auto(&mut self, start: usize, typ: &str) -> Result<Element, PolicyError> {
        let elements = self.union("]")?;
        Ok(Element::SimpleAuto {
            typ: typ.to_string(),
            elements,
            span: self.span_from(start),
        })
    }

    /// Parse `A.B.C.D/n` with the prefix length checked against the
    /// address family's bit width.
    fn ip_prefix(&mut self) -> Result<IpPrefix, PolicyError> {
        let Some(i) = self.tok.find('/') else {
            return self.err("Expected 'IP/prefixlen'");
        };
        let Ok(addr) = self.tok[..i].parse::<IpAddr>() else {
            return self.err("IP address expected");
        };
        let bits: u32 = if addr.is_ipv4() { 32 } else { 128 };
        match self.tok[i + 1..].parse::<u32>() {
            Ok(len) if len <= bits => {
                self.next();
                Ok(IpPrefix {
                    addr,
                    len: len as u8,
                })
            }
            _ => self.err("Prefixlen expected"),
        }
    }

    fn agg_auto(&mut self, start: usize, typ: &str) -> Result<Element, PolicyError> {
        let mut net = None;
        if self.check("ip") {
            self.check("=");
            net = Some(self.ip_prefix()?);
            self.expect("&")?;
        }
        let elements = self.union("]")?;
        Ok(Element::AggAuto {
            typ: typ.to_string(),
            net,
            elements,
            span: self.span_from(start),
        })
    }

    fn intf_auto(&mut self, start: usize, typ: &str) -> Result<Element, PolicyError> {
        let managed = if self.check("managed") {
            self.expect("&")?;
            true
        } else {
            false
        };
        let elements = self.union("]")?;
        self.expect(".[")?;
        let selector = self.selector()?;
        Ok(Element::IntfAuto {
            typ: typ.to_string(),
            managed,
            selector,
            elements,
            span: self.span_from(start),
        })
    }

    fn extended_name(&mut self) -> Result<Element, PolicyError> {
        if self.tok == "user" {
            let start = self.pos;
            self.next();
            return Ok(Element::User {
                span: self.span_from(start),
            });
        }
        let (typ, name) = self.typed_name()?;
        if name == "[" {
            let start = self.pos;
            self.next();
            return match typ {
                "host" | "network" => self.simple_auto(start, typ),
                "any" => self.agg_auto(start, typ),
                "interface" => self.intf_auto(start, typ),
                _ => self.err("Unexpected automatic group"),
            };
        }
        match typ {
            "host" => self.host_ref(typ, name),
            "network" => self.network_ref(typ, name),
            "interface" => self.intf_ref(typ, name),
            "any" | "area" | "group" => self.simple_ref(typ, name),
            _ => self.err("Unknown element type"),
        }
    }

    fn complement(&mut self) -> Result<Element, PolicyError> {
        let start = self.pos;
        if self.check("!") {
            let element = self.extended_name()?;
            Ok(Element::Complement {
                element: Box::new(element),
                span: self.span_from(start),
            })
        } else {
            self.extended_name()
        }
    }

    /// Collapses to its single child when no `&` follows.
    fn intersection(&mut self) -> Result<Element, PolicyError> {
        let start = self.pos;
        let mut list = vec![self.complement()?];
        while self.check("&") {
            list.push(self.complement()?);
        }
        if list.len() > 1 {
            Ok(Element::Intersection {
                list,
                span: self.span_from(start),
            })
        } else {
            Ok(list.remove(0))
        }
    }

    /// Comma separated list of elements stopped by `stop`.
    /// A trailing comma before the terminator is accepted and discarded.
    fn union(&mut self, stop: &str) -> Result<Vec<Element>, PolicyError> {
        let mut union = vec![self.intersection()?];
        while !self.check(stop) {
            self.expect(",")?;
            if self.check(stop) {
                break;
            }
            union.push(self.intersection()?);
        }
        Ok(union)
    }
}

// ----------------------------------------------------------------------------
// Toplevel definitions

impl<'s> Parser<'s> {
    fn description(&mut self) -> Result<Option<Description>, PolicyError> {
        if self.tok != "description" {
            return Ok(None);
        }
        let start = self.pos;
        self.next();
        if self.tok != "=" {
            return self.err("Expected '='");
        }
        let (_, text) = self.scanner.to_eol();
        let text = text.to_string();
        self.next();
        Ok(Some(Description {
            text,
            span: self.span_from(start),
        }))
    }

    fn group(&mut self) -> Result<Toplevel, PolicyError> {
        let start = self.pos;
        let name = self.tok.to_string();
        self.next();
        self.expect("=")?;
        let description = self.description()?;
        let elements = if self.check(";") {
            Vec::new()
        } else {
            self.union(";")?
        };
        Ok(Toplevel::Group(Group {
            name,
            description,
            elements,
            span: self.span_from(start),
            file: self.file.to_string(),
        }))
    }

    /// `name;` or `name = value, ...;` — values are opaque tokens.
    fn attribute(&mut self) -> Result<Attribute, PolicyError> {
        let start = self.pos;
        let name = self.tok.to_string();
        self.verify_simple_name(&name)?;
        self.next();
        let mut values = Vec::new();
        if self.check("=") {
            while !self.check(";") {
                if self.tok.is_empty() || self.tok == "}" {
                    return self.err("Expected ';'");
                }
                let vstart = self.pos;
                let value = self.tok.to_string();
                self.next();
                values.push(Value {
                    value,
                    span: self.span_from(vstart),
                });
                if self.check(";") {
                    break;
                }
                self.expect(",")?;
            }
        } else {
            self.expect(";")?;
        }
        Ok(Attribute {
            name,
            values,
            span: self.span_from(start),
        })
    }

    /// One protocol entry: a `protocol:`/`protocolgroup:` reference or a
    /// simple protocol with detail tokens up to `,` / `;`.
    fn protocol(&mut self) -> Result<Protocol, PolicyError> {
        let start = self.pos;
        if let Some(i) = self.tok.find(':') {
            let typ = &self.tok[..i];
            let name = &self.tok[i + 1..];
            if !(typ == "protocol" || typ == "protocolgroup") {
                return self.err("Unknown protocol type");
            }
            self.verify_simple_name(name)?;
            let (typ, name) = (typ.to_string(), name.to_string());
            self.next();
            return Ok(Protocol::Ref {
                typ,
                name,
                span: self.span_from(start),
            });
        }
        if self.tok.is_empty() {
            return self.err("Protocol expected");
        }
        let proto = self.tok.to_string();
        self.next();
        let mut details = Vec::new();
        while !(self.tok == "," || self.tok == ";" || self.tok == "}" || self.tok.is_empty()) {
            details.push(self.tok.to_string());
            self.next();
        }
        Ok(Protocol::Simple {
            proto,
            details,
            span: self.span_from(start),
        })
    }

    fn protocol_union(&mut self, stop: &str) -> Result<Vec<Protocol>, PolicyError> {
        let mut union = vec![self.protocol()?];
        while !self.check(stop) {
            self.expect(",")?;
            if self.check(stop) {
                break;
            }
            union.push(self.protocol()?);
        }
        Ok(union)
    }

    fn rule(&mut self) -> Result<Rule, PolicyError> {
        let start = self.pos;
        let deny = self.tok == "deny";
        self.next();
        self.expect("src")?;
        self.expect("=")?;
        let src = self.union(";")?;
        self.expect("dst")?;
        self.expect("=")?;
        let dst = self.union(";")?;
        self.expect("prt")?;
        self.expect("=")?;
        let prt = self.protocol_union(";")?;
        let log = if self.tok == "log" {
            Some(self.attribute()?)
        } else {
            None
        };
        Ok(Rule {
            deny,
            src,
            dst,
            prt,
            log,
            span: self.span_from(start),
        })
    }

    fn service(&mut self) -> Result<Toplevel, PolicyError> {
        let start = self.pos;
        let name = self.tok.to_string();
        self.next();
        self.expect("=")?;
        self.expect("{")?;
        let description = self.description()?;
        let mut attributes = Vec::new();
        while !(self.tok == "user" || self.tok == "}" || self.tok.is_empty()) {
            attributes.push(self.attribute()?);
        }
        self.expect("user")?;
        self.expect("=")?;
        let foreach = self.check("foreach");
        let user = if self.check(";") {
            Vec::new()
        } else {
            self.union(";")?
        };
        let mut rules = Vec::new();
        while self.tok == "permit" || self.tok == "deny" {
            rules.push(self.rule()?);
        }
        self.expect("}")?;
        Ok(Toplevel::Service(Service {
            name,
            description,
            attributes,
            foreach,
            user,
            rules,
            span: self.span_from(start),
            file: self.file.to_string(),
        }))
    }

    fn toplevel(&mut self) -> Result<Toplevel, PolicyError> {
        let (typ, name) = self.typed_name()?;

        // Check for xxx:xxx | router:xx@xx | network:xx/xx
        let shape_ok = typ == "router" && is_router_name(name)
            || typ == "network" && is_network_name(name)
            || is_simple_name(name);
        if !shape_ok {
            return self.err("Invalid token");
        }
        match typ {
            "group" => self.group(),
            "service" => self.service(),
            _ => self.err("Unknown global definition"),
        }
    }

    fn file(&mut self) -> Result<Vec<Toplevel>, PolicyError> {
        let mut list = Vec::new();
        while !self.tok.is_empty() {
            list.push(self.toplevel()?);
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Toplevel> {
        parse_file(src, "test").expect("input should parse")
    }

    fn parse_err(src: &str) -> String {
        parse_file(src, "test").expect_err("input should fail").to_string()
    }

    fn group_elements(t: &Toplevel) -> &[Element] {
        match t {
            Toplevel::Group(g) => &g.elements,
            _ => panic!("expected group"),
        }
    }

    #[test]
    fn empty_group() {
        let list = parse("group:g1 = ;");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name(), "group:g1");
        assert!(group_elements(&list[0]).is_empty());
    }

    #[test]
    fn union_with_trailing_comma() {
        let list = parse("group:g1 = host:h1, network:n1,;");
        assert_eq!(group_elements(&list[0]).len(), 2);
    }

    #[test]
    fn intersection_collapses_singletons() {
        let list = parse("group:g1 = host:h1;");
        assert!(matches!(
            group_elements(&list[0])[0],
            Element::NamedRef { .. }
        ));
    }

    #[test]
    fn intersection_keeps_complements_on_rest() {
        let list = parse("group:g1 = group:a & group:b &! host:h1;");
        let Element::Intersection { list: l, .. } = &group_elements(&list[0])[0] else {
            panic!("expected intersection");
        };
        assert_eq!(l.len(), 3);
        assert!(matches!(l[0], Element::NamedRef { .. }));
        assert!(matches!(l[2], Element::Complement { .. }));
    }

    #[test]
    fn interface_with_selector() {
        let list = parse("group:g1 = interface:r1.[all];");
        let Element::IntfRef {
            network, extension, ..
        } = &group_elements(&list[0])[0]
        else {
            panic!("expected interface ref");
        };
        assert_eq!(network, "[");
        assert_eq!(extension, "all");
    }

    #[test]
    fn interface_with_extension() {
        let list = parse("group:g1 = interface:r1.n1.sec;");
        let Element::IntfRef {
            router,
            network,
            extension,
            ..
        } = &group_elements(&list[0])[0]
        else {
            panic!("expected interface ref");
        };
        assert_eq!(router, "r1");
        assert_eq!(network, "n1");
        assert_eq!(extension, "sec");
    }

    #[test]
    fn id_hostnames_are_accepted() {
        parse("group:g1 = host:id:user@example.com, host:id:@example.com;");
    }

    #[test]
    fn aggregate_auto_with_ip_filter() {
        let list = parse("group:g1 = any:[ip = 10.1.0.0/16 & network:n1];");
        let Element::AggAuto { net, elements, .. } = &group_elements(&list[0])[0] else {
            panic!("expected aggregate auto group");
        };
        assert_eq!(net.as_ref().map(|n| n.to_string()).as_deref(), Some("10.1.0.0/16"));
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn interface_auto_with_managed_filter() {
        let list = parse("group:g1 = interface:[managed & network:n1].[auto];");
        let Element::IntfAuto {
            managed, selector, ..
        } = &group_elements(&list[0])[0]
        else {
            panic!("expected interface auto group");
        };
        assert!(managed);
        assert_eq!(selector, "auto");
    }

    #[test]
    fn service_with_attributes_and_rules() {
        let list = parse(
            "service:s1 = {\n\
             \x20multi_owner;\n\
             \x20overlaps = service:a, service:b;\n\
             \x20user = network:n1;\n\
             \x20permit src = user; dst = host:h1; prt = tcp 80;\n\
             \x20deny src = user; dst = any:[area:a1]; prt = udp 53; log = high;\n\
             }",
        );
        let Toplevel::Service(s) = &list[0] else {
            panic!("expected service");
        };
        assert_eq!(s.attributes.len(), 2);
        assert_eq!(s.attributes[1].values.len(), 2);
        assert!(!s.foreach);
        assert_eq!(s.rules.len(), 2);
        assert!(s.rules[1].deny);
        assert!(s.rules[1].log.is_some());
        let Protocol::Simple { proto, details, .. } = &s.rules[0].prt[0] else {
            panic!("expected simple protocol");
        };
        assert_eq!(proto, "tcp");
        assert_eq!(details, &["80"]);
    }

    #[test]
    fn service_user_foreach() {
        let list = parse("service:s1 = {\n user = foreach host:h2, host:h1;\n permit src = user; dst = host:h3; prt = ip;\n}");
        let Toplevel::Service(s) = &list[0] else {
            panic!("expected service");
        };
        assert!(s.foreach);
        assert_eq!(s.user.len(), 2);
    }

    #[test]
    fn description_is_opaque_to_end_of_line() {
        let list = parse("group:g1 =\n description = web servers # not a comment\n host:h1;");
        let d = list[0].description().expect("description");
        assert_eq!(d.text, " web servers # not a comment");
    }

    #[test]
    fn unknown_global_definition() {
        assert_eq!(
            parse_err("foo:x ="),
            "Syntax error: Unknown global definition at line 1 of test, \
             near \"foo:x<--HERE--> =\""
        );
    }

    #[test]
    fn unknown_element_type() {
        assert!(parse_err("group:g1 = foo:x;").contains("Unknown element type"));
    }

    #[test]
    fn unexpected_automatic_group() {
        assert!(parse_err("group:g1 = area:[network:n1];").contains("Unexpected automatic group"));
    }

    #[test]
    fn vrf_in_network_part_is_rejected() {
        assert!(parse_err("group:g1 = interface:r1.n1@vrf2;").contains("Interface name expected"));
    }

    #[test]
    fn double_extension_is_rejected() {
        assert!(parse_err("group:g1 = interface:r1.n1.a.b;").contains("Interface name expected"));
    }

    #[test]
    fn ip_filter_error_messages_are_distinct() {
        assert!(parse_err("group:g1 = any:[ip = 10.1.0.0 & network:n1];")
            .contains("Expected 'IP/prefixlen'"));
        assert!(parse_err("group:g1 = any:[ip = 10.1.0/8 & network:n1];")
            .contains("IP address expected"));
        assert!(parse_err("group:g1 = any:[ip = 10.1.0.0/33 & network:n1];")
            .contains("Prefixlen expected"));
    }

    #[test]
    fn ipv6_prefix_length_uses_wider_bound() {
        parse("group:g1 = any:[ip = 2001:db8::/64 & network:n1];");
        assert!(parse_err("group:g1 = any:[ip = 2001:db8::/129 & network:n1];")
            .contains("Prefixlen expected"));
    }

    #[test]
    fn missing_typed_name() {
        assert!(parse_err("group = ;").contains("Typed name expected"));
    }

    #[test]
    fn bad_toplevel_name_shape() {
        assert!(parse_err("group:a.b = ;").contains("Invalid token"));
    }
}
