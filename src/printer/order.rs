//! Canonical ordering of union members.
//!
//! Ordering is a display convenience only: it is computed freshly on every
//! render and never touches the syntax tree. Elements are partitioned by
//! category, then sorted by an address key extracted from their name text;
//! names without an embedded address sort first, lexically.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{Element, Protocol};

/// Fixed category priority: user < group < any < network < interface < host.
/// An intersection takes the category of its first member, a complement the
/// category of its negated element.
fn category(el: &Element) -> u8 {
    match el {
        Element::User { .. } => 0,
        Element::NamedRef { typ, .. } => type_rank(typ),
        Element::IntfRef { .. } => type_rank("interface"),
        Element::SimpleAuto { typ, .. } | Element::AggAuto { typ, .. } => type_rank(typ),
        Element::IntfAuto { .. } => type_rank("interface"),
        Element::Intersection { list, .. } => list.first().map_or(1, category),
        Element::Complement { element, .. } => category(element),
    }
}

fn type_rank(typ: &str) -> u8 {
    match typ {
        "group" => 1,
        "any" => 2,
        "network" => 3,
        "interface" => 4,
        "host" => 5,
        // "area" and friends have no slot of their own; keep them with
        // the named groups.
        _ => 1,
    }
}

/// Flattened name text used for lexical comparison and address extraction.
fn flat_name(el: &Element) -> String {
    match el {
        Element::NamedRef { name, .. } => name.clone(),
        Element::IntfRef {
            router,
            network,
            extension,
            ..
        } => {
            if network == "[" {
                format!("{router}.[{extension}]")
            } else if extension.is_empty() {
                format!("{router}.{network}")
            } else {
                format!("{router}.{network}.{extension}")
            }
        }
        Element::User { .. } => "user".to_string(),
        Element::SimpleAuto { typ, elements, .. }
        | Element::AggAuto { typ, elements, .. }
        | Element::IntfAuto { typ, elements, .. } => {
            let inner: Vec<String> = elements.iter().map(flat_name).collect();
            format!("{typ}:[{}]", inner.join(","))
        }
        Element::Intersection { list, .. } => list.first().map_or_else(String::new, flat_name),
        Element::Complement { element, .. } => flat_name(element),
    }
}

static ADDR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?:^|[^0-9])
        (\d{1,3})[._](\d{1,3})[._](\d{1,3})[._](\d{1,3})
        (?:-([0-9]{1,3}(?:[._][0-9]{1,3}){3}|[0-9]+))?
        ",
    )
    .expect("address pattern must compile")
});

fn octets_to_u32(a: u32, b: u32, c: u32, d: u32) -> Option<u32> {
    if a > 255 || b > 255 || c > 255 || d > 255 {
        return None;
    }
    Some((a << 24) | (b << 16) | (c << 8) | d)
}

fn parse_quad(s: &str) -> Option<u32> {
    let mut parts = s.split(['.', '_']);
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    let c = parts.next()?.parse().ok()?;
    let d = parts.next()?.parse().ok()?;
    octets_to_u32(a, b, c, d)
}

/// Try to extract a dotted-quad-style IPv4 address from name text.
/// Returns `(address, suffix)` where the suffix is the `-`-delimited prefix
/// length or range end, used only as a tie-break.
fn addr_key(name: &str) -> Option<(u32, u64)> {
    for cap in ADDR.captures_iter(name) {
        let quad = octets_to_u32(
            cap[1].parse().ok()?,
            cap[2].parse().ok()?,
            cap[3].parse().ok()?,
            cap[4].parse().ok()?,
        );
        let Some(addr) = quad else { continue };
        let suffix = cap.get(5).map_or(0u64, |m| {
            let s = m.as_str();
            parse_quad(s)
                .map(u64::from)
                .or_else(|| s.parse::<u64>().ok())
                .unwrap_or(0)
        });
        return Some((addr, suffix));
    }
    None
}

type ElementKey = (u8, Option<(u32, u64)>, String);

fn element_key(el: &Element) -> ElementKey {
    let name = flat_name(el);
    (category(el), addr_key(&name), name)
}

/// Canonically ordered view of a union's members.
pub(crate) fn order_elements(list: &[Element]) -> Vec<&Element> {
    let mut out: Vec<&Element> = list.iter().collect();
    out.sort_by_cached_key(|el| element_key(el));
    out
}

/// Protocol priority: named references, then icmp, proto, tcp, udp,
/// then anything else; numeric detail fields ascending within a group.
fn protocol_key(p: &Protocol) -> (u8, String, Vec<u64>, String) {
    match p {
        Protocol::Ref { typ, name, .. } => (0, format!("{typ}:{name}"), Vec::new(), String::new()),
        Protocol::Simple { proto, details, .. } => {
            let rank = match proto.as_str() {
                "icmp" => 1,
                "proto" => 2,
                "tcp" => 3,
                "udp" => 4,
                _ => 5,
            };
            let mut nums = Vec::new();
            for d in details {
                for run in d.split(|c: char| !c.is_ascii_digit()) {
                    if let Ok(n) = run.parse::<u64>() {
                        nums.push(n);
                    }
                }
            }
            (rank, proto.clone(), nums, details.join(" "))
        }
    }
}

pub(crate) fn order_protocols(list: &[Protocol]) -> Vec<&Protocol> {
    let mut out: Vec<&Protocol> = list.iter().collect();
    out.sort_by_cached_key(|p| protocol_key(p));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn named(typ: &str, name: &str) -> Element {
        Element::NamedRef {
            typ: typ.to_string(),
            name: name.to_string(),
            span: Span::default(),
        }
    }

    fn names(ordered: &[&Element]) -> Vec<String> {
        ordered.iter().map(|e| flat_name(e)).collect()
    }

    #[test]
    fn categories_partition_in_fixed_order() {
        let list = vec![
            named("host", "h1"),
            named("network", "n1"),
            named("any", "a1"),
            named("interface", "r1.n1"),
            named("group", "g1"),
        ];
        let ordered = order_elements(&list);
        assert_eq!(names(&ordered), ["g1", "a1", "n1", "r1.n1", "h1"]);
    }

    #[test]
    fn plain_names_sort_before_addresses() {
        let list = vec![
            named("host", "h_10.1.1.2"),
            named("host", "zz"),
            named("host", "h_10.1.1.10"),
            named("host", "aa"),
        ];
        let ordered = order_elements(&list);
        assert_eq!(names(&ordered), ["aa", "zz", "h_10.1.1.2", "h_10.1.1.10"]);
    }

    #[test]
    fn addresses_sort_numerically_not_lexically() {
        assert!(addr_key("h_10.1.1.9") < addr_key("h_10.1.1.10"));
        assert!(addr_key("net_10.2.0.0") < addr_key("net_10.10.0.0"));
    }

    #[test]
    fn underscore_separated_quads_are_recognized() {
        assert_eq!(addr_key("host_10_1_2_3"), Some(((10 << 24) | (1 << 16) | (2 << 8) | 3, 0)));
    }

    #[test]
    fn invalid_octets_are_not_addresses() {
        assert_eq!(addr_key("h_10.1.1.256"), None);
        assert_eq!(addr_key("v1.2.3"), None);
    }

    #[test]
    fn range_suffix_is_a_tie_break_only() {
        let a = addr_key("range_10.1.1.5-10.1.1.9").expect("range");
        let b = addr_key("range_10.1.1.5-10.1.1.7").expect("range");
        assert_eq!(a.0, b.0);
        assert!(b < a);
        let c = addr_key("net_10.1.1.0-24").expect("prefix");
        assert_eq!(c.1, 24);
    }

    #[test]
    fn intersection_takes_first_member_category() {
        let inter = Element::Intersection {
            list: vec![named("group", "g2"), named("host", "h9")],
            span: Span::default(),
        };
        let list = vec![named("network", "n1"), inter];
        let ordered = order_elements(&list);
        assert_eq!(names(&ordered)[0], "g2");
    }

    #[test]
    fn protocol_priority_order() {
        let simple = |proto: &str, details: &[&str]| Protocol::Simple {
            proto: proto.to_string(),
            details: details.iter().map(|d| d.to_string()).collect(),
            span: Span::default(),
        };
        let list = vec![
            simple("udp", &["53"]),
            simple("tcp", &["443"]),
            simple("tcp", &["80"]),
            simple("icmp", &["8"]),
            simple("proto", &["50"]),
            Protocol::Ref {
                typ: "protocol".to_string(),
                name: "ftp".to_string(),
                span: Span::default(),
            },
        ];
        let ordered = order_protocols(&list);
        let shown: Vec<String> = ordered
            .iter()
            .map(|p| match p {
                Protocol::Ref { typ, name, .. } => format!("{typ}:{name}"),
                Protocol::Simple { proto, details, .. } => {
                    format!("{proto} {}", details.join(" "))
                }
            })
            .collect();
        assert_eq!(
            shown,
            ["protocol:ftp", "icmp 8", "proto 50", "tcp 80", "tcp 443", "udp 53"]
        );
    }
}
