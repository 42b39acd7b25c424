//! Topology graph construction.
//!
//! Builds a [`System`] from three line-oriented text corpora: a positional
//! dump (runs of 3D coordinates delimited by `{chain-id}` markers, each run
//! linked as a path graph), an adjacency listing (coordinate pairs adding
//! arbitrary extra edges, e.g. cross-links between chains), and an optional
//! controller layout (an IP line followed by one comma-separated line of
//! chain ids per pin; a trailing `'` marks a reversed chain).
//!
//! The intermediate graph arena is local to construction: once neighbor
//! lists are wired into the LEDs it is dropped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    error::{LoomError, LoomResult},
    system::{Chain, Controller, PhysicalAddr, System, dist_sq},
};

static CHAIN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\{(\d+)\}\s*$").expect("chain marker pattern"));

static COORD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\.\s*\{\s*(-?\d+(?:\.\d+)?),\s*(-?\d+(?:\.\d+)?),\s*(-?\d+(?:\.\d+)?)\s*\}\s*$")
        .expect("coordinate pattern")
});

static FLOAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("float pattern"));

static IP_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*((?:\d{1,3}\.){3}\d{1,3})\s*$").expect("ip pattern"));

pub struct TopologySources<'a> {
    pub positions: &'a str,
    pub adjacency: &'a str,
    /// `None` for debug-only rigs with no physical controllers.
    pub controllers: Option<&'a str>,
}

/// Builds the populated, normalized system. Malformed lines are logged and
/// skipped; an adjacency record that cannot resolve to any vertex is fatal
/// because the installation cannot start with an incomplete topology.
pub fn build(sources: &TopologySources) -> LoomResult<System> {
    let mut controllers = BTreeMap::new();
    let mut chain_to_ip = HashMap::new();
    if let Some(layout) = sources.controllers {
        (controllers, chain_to_ip) = parse_controllers(layout)?;
    }

    let mut sys = System::new();
    let mut arena = GraphArena::default();
    // Raw (pre-normalization) coordinates, bit-exact, for adjacency lookup.
    let mut exact: HashMap<[u64; 3], usize> = HashMap::new();

    let mut chain_id: u32 = 0;
    let mut run: Vec<usize> = Vec::new();
    let mut unmapped_chains: HashSet<u32> = HashSet::new();

    for (lineno, line) in sources.positions.lines().enumerate() {
        if let Some(caps) = CHAIN_MARKER.captures(line) {
            arena.link_run(&run);
            run.clear();
            chain_id = parse_or_skip(&caps[1], lineno, "chain id").unwrap_or(chain_id);
            continue;
        }

        let Some(caps) = COORD_LINE.captures(line) else {
            if !line.trim().is_empty() {
                warn!(lineno, line, "unmatched position line, skipping");
            }
            continue;
        };

        let (Some(position), Some(x), Some(y), Some(z)) = (
            parse_or_skip::<u32>(&caps[1], lineno, "chain position"),
            parse_or_skip::<f64>(&caps[2], lineno, "x"),
            parse_or_skip::<f64>(&caps[3], lineno, "y"),
            parse_or_skip::<f64>(&caps[4], lineno, "z"),
        ) else {
            continue;
        };

        let ip = chain_to_ip.get(&chain_id).cloned();
        if ip.is_none() && sources.controllers.is_some() && unmapped_chains.insert(chain_id) {
            warn!(chain_id, "chain has no controller mapping");
        }
        if let Some(ip) = &ip
            && let Some(chain) = controllers
                .get_mut(ip)
                .and_then(|c: &mut Controller| c.chains.get_mut(&chain_id))
        {
            chain.len += 1;
        }

        let id = sys.add_led(
            x,
            y,
            z,
            PhysicalAddr {
                controller: ip,
                chain: chain_id,
                position,
            },
        );
        arena.add_vertex();
        exact.entry(coord_key(x, y, z)).or_insert(id);
        run.push(id);
    }
    arena.link_run(&run);

    for (lineno, line) in sources.adjacency.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let floats: Vec<f64> = FLOAT
            .find_iter(line)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        if floats.len() < 6 {
            warn!(lineno, line, "unmatched adjacency line, skipping");
            continue;
        }
        let a = resolve_vertex(&sys, &exact, floats[0], floats[1], floats[2])?;
        let b = resolve_vertex(&sys, &exact, floats[3], floats[4], floats[5])?;
        arena.add_edge(a, b);
    }

    sys.normalize();

    for (id, neighbors) in arena.into_neighbor_lists().into_iter().enumerate() {
        if let Some(led) = sys.led_mut(id) {
            led.neighbors = neighbors;
        }
    }

    for controller in controllers.into_values() {
        sys.register_controller(controller);
    }

    info!(leds = sys.len(), "topology loaded");
    Ok(sys)
}

fn parse_or_skip<T: std::str::FromStr>(s: &str, lineno: usize, what: &str) -> Option<T> {
    match s.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(lineno, what, value = s, "unparseable field, skipping record");
            None
        }
    }
}

fn coord_key(x: f64, y: f64, z: f64) -> [u64; 3] {
    [x.to_bits(), y.to_bits(), z.to_bits()]
}

/// Exact bit-pattern match first; otherwise the nearest Euclidean vertex.
/// The fallback exists because coordinate precision can drift between the
/// positional dump and the adjacency listing.
fn resolve_vertex(
    sys: &System,
    exact: &HashMap<[u64; 3], usize>,
    x: f64,
    y: f64,
    z: f64,
) -> LoomResult<usize> {
    if let Some(&id) = exact.get(&coord_key(x, y, z)) {
        return Ok(id);
    }

    let nearest = sys
        .leds()
        .iter()
        .min_by(|a, b| {
            dist_sq(x, y, z, a.x, a.y, a.z).total_cmp(&dist_sq(x, y, z, b.x, b.y, b.z))
        })
        .ok_or_else(|| {
            LoomError::topology(format!(
                "adjacency record ({x}, {y}, {z}) cannot resolve: no vertices loaded"
            ))
        })?;
    debug!(
        x,
        y,
        z,
        led = nearest.id,
        dist = dist_sq(x, y, z, nearest.x, nearest.y, nearest.z).sqrt(),
        "adjacency coordinate resolved by nearest match"
    );
    Ok(nearest.id)
}

fn parse_controllers(
    layout: &str,
) -> LoomResult<(BTreeMap<String, Controller>, HashMap<u32, String>)> {
    let mut controllers: BTreeMap<String, Controller> = BTreeMap::new();
    let mut chain_to_ip = HashMap::new();
    let mut current_ip: Option<String> = None;
    let mut pin: u32 = 0;

    for (lineno, line) in layout.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(caps) = IP_LINE.captures(line) {
            let ip = caps[1].to_string();
            controllers.insert(
                ip.clone(),
                Controller {
                    ip: ip.clone(),
                    chains: BTreeMap::new(),
                },
            );
            current_ip = Some(ip);
            pin = 0;
            continue;
        }

        let Some(ip) = &current_ip else {
            warn!(lineno, line, "chain list before any controller ip, skipping");
            continue;
        };

        let mut pos_on_pin = 0;
        for raw in line.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (id_str, reversed) = match raw.strip_suffix('\'') {
                Some(rest) => (rest, true),
                None => (raw, false),
            };
            let Some(id) = parse_or_skip::<u32>(id_str, lineno, "chain id") else {
                continue;
            };
            let chains = &mut controllers
                .get_mut(ip)
                .ok_or_else(|| LoomError::topology("controller vanished during parse"))?
                .chains;
            chains.insert(
                id,
                Chain {
                    id,
                    pin,
                    pos_on_pin,
                    len: 0,
                    reversed,
                },
            );
            chain_to_ip.insert(id, ip.clone());
            pos_on_pin += 1;
        }
        pin += 1;
    }

    Ok((controllers, chain_to_ip))
}

#[derive(Default)]
struct GraphArena {
    edges: Vec<Vec<usize>>,
}

impl GraphArena {
    fn add_vertex(&mut self) {
        self.edges.push(Vec::new());
    }

    fn add_edge(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.edges[a].push(b);
        self.edges[b].push(a);
    }

    /// Links a contiguous coordinate run as a path graph (i ~ i+1).
    fn link_run(&mut self, run: &[usize]) {
        for pair in run.windows(2) {
            self.add_edge(pair[0], pair[1]);
        }
    }

    /// Consumes the arena, deduplicating while keeping insertion order.
    fn into_neighbor_lists(self) -> Vec<Vec<usize>> {
        self.edges
            .into_iter()
            .map(|list| {
                let mut seen = HashSet::new();
                list.into_iter().filter(|&n| seen.insert(n)).collect()
            })
            .collect()
    }
}
