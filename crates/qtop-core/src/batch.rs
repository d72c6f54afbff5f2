//! Status queries against the PBS batch protocol.
//!
//! A status exchange is one request frame followed by one reply frame, both
//! DIS-encoded. The reply carries a list of entities (nodes or jobs), each
//! an attribute list, which is decoded here into typed records.

use std::collections::HashMap;

use tracing::debug;

use crate::conn::Conn;
use crate::error::{Error, Result};

// Batch protocol constants, fixed by the wire format.
const PROT_TYPE: i64 = 2;
const PROT_VER: i64 = 2;
const STATUS_JOB: i64 = 19;
const STATUS_NODE: i64 = 58;
const REPLY_STATUS: i64 = 6;

/// State of one compute node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub state: String,
    pub slot_count: u32,
}

/// State of one batch job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub state: String,
    pub exec_slots: Vec<Slot>,
    pub walltime: u64,
    pub cputime: u64,
}

/// One execution slot on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub node: String,
    pub index: u32,
}

/// Raw status record for a single node, job or queue.
struct Entity {
    name: String,
    attrs: HashMap<String, String>,
}

/// Queries the state of the compute nodes in the cluster.
pub fn query_nodes(conn: &mut dyn Conn) -> Result<Vec<Node>> {
    let entities = query_status(conn, STATUS_NODE)?;
    entities.into_iter().map(decode_node).collect()
}

/// Queries the state of the batch jobs in the cluster.
pub fn query_jobs(conn: &mut dyn Conn) -> Result<Vec<Job>> {
    let entities = query_status(conn, STATUS_JOB)?;
    entities.into_iter().map(decode_job).collect()
}

fn decode_node(entity: Entity) -> Result<Node> {
    let slot_count = entity
        .attrs
        .get("np")
        .and_then(|np| np.parse::<u32>().ok())
        .ok_or_else(|| Error::Attr("np".into()))?;

    Ok(Node {
        name: entity.name,
        state: entity.attrs.get("state").cloned().unwrap_or_default(),
        slot_count,
    })
}

fn decode_job(entity: Entity) -> Result<Job> {
    let attrs = &entity.attrs;

    let mut job = Job {
        id: entity.name.clone(),
        name: attrs.get("Job_Name").cloned().unwrap_or_default(),
        owner: attrs.get("Job_Owner").cloned().unwrap_or_default(),
        state: attrs.get("job_state").cloned().unwrap_or_default(),
        ..Job::default()
    };

    if let Some(exec_host) = attrs.get("exec_host") {
        job.exec_slots = parse_exec_host(exec_host)?;
    }
    if let Some(walltime) = attrs.get("resources_used.walltime") {
        job.walltime = parse_clock(walltime)?;
    }
    if let Some(cputime) = attrs.get("resources_used.cput") {
        job.cputime = parse_clock(cputime)?;
    }

    Ok(job)
}

/// Parses an `exec_host` attribute into individual slots.
///
/// ```text
/// exec_host  = host_slots *( "+" host_slots )
/// host_slots = host "/" slot_range *( "," slot_range )
/// slot_range = int [ "-" int ]
/// ```
///
/// A closed range expands inclusively; the output preserves the order of
/// appearance. An empty attribute yields no slots.
pub fn parse_exec_host(s: &str) -> Result<Vec<Slot>> {
    let mut slots = Vec::new();
    if s.is_empty() {
        return Ok(slots);
    }

    for host_slots in s.split('+') {
        let (host, ranges) = split_field(host_slots, '/');

        for range in ranges.split(',') {
            let (first, last) = split_field(range, '-');
            let last = if last.is_empty() { first } else { last };

            let i = parse_slot_index(first)?;
            let j = parse_slot_index(last)?;

            for index in i..=j {
                slots.push(Slot {
                    node: host.to_string(),
                    index,
                });
            }
        }
    }

    Ok(slots)
}

fn parse_slot_index(s: &str) -> Result<u32> {
    s.parse::<u32>()
        .map_err(|_| Error::BadFormat(format!("exec_host slot index {s:?}")))
}

/// Parses a `[[hh:]mm:]ss` clock string into seconds.
pub fn parse_clock(s: &str) -> Result<u64> {
    let mut clock = 0u64;
    let mut rest = s;

    while !rest.is_empty() {
        let (field, tail) = split_field(rest, ':');
        let n = field
            .parse::<u64>()
            .map_err(|_| Error::BadFormat(format!("clock field {field:?}")))?;
        clock = clock * 60 + n;
        rest = tail;
    }

    Ok(clock)
}

/// Splits at the first occurrence of `sep`; the second half is empty when
/// the separator is absent.
fn split_field(s: &str, sep: char) -> (&str, &str) {
    match s.split_once(sep) {
        Some((head, tail)) => (head, tail),
        None => (s, ""),
    }
}

/// Sends a status request for `fun` and reads the reply into entities.
fn query_status(conn: &mut dyn Conn, fun: i64) -> Result<Vec<Entity>> {
    conn.write_int(PROT_TYPE)?;
    conn.write_int(PROT_VER)?;
    conn.write_int(fun)?;
    let user = conn.user().to_owned();
    conn.write_string(&user)?;
    conn.write_string("")?; // entity id filter; empty selects all
    conn.write_int(0)?; // attribute selector count
    conn.write_int(0)?; // extension count
    conn.flush()?;

    let choice = read_reply_header(conn)?;
    if choice != REPLY_STATUS {
        return Err(Error::Protocol(format!("unexpected reply choice {choice}")));
    }

    let count = conn.read_int()?;
    debug!(fun, count, "status reply");

    let mut entities = Vec::new();
    for _ in 0..count {
        conn.read_int()?; // entity type, unused
        let name = conn.read_string()?;
        let attrs = read_attr_list(conn)?;
        entities.push(Entity { name, attrs });
    }

    Ok(entities)
}

/// Reads and validates the reply header, returning the payload choice.
fn read_reply_header(conn: &mut dyn Conn) -> Result<i64> {
    let prot_type = conn.read_int()?;
    let prot_ver = conn.read_int()?;
    if prot_type != PROT_TYPE || prot_ver != PROT_VER {
        return Err(Error::Protocol(format!(
            "unrecognized protocol: type={prot_type} ver={prot_ver}"
        )));
    }

    let code = conn.read_int()?;
    let aux = conn.read_int()?;
    if code != 0 {
        return Err(Error::Protocol(format!("server error code={code} aux={aux}")));
    }

    conn.read_int()
}

/// Reads an attribute list into a map. Resource subkeys are folded into the
/// main key with a `.` separator; a repeated key keeps the last value.
fn read_attr_list(conn: &mut dyn Conn) -> Result<HashMap<String, String>> {
    let count = conn.read_int()?;

    let mut attrs = HashMap::new();
    for _ in 0..count {
        conn.read_int()?; // operator, unused

        let mut key = conn.read_string()?;
        let has_resource = conn.read_int()?;
        if has_resource != 0 {
            let resource = conn.read_string()?;
            key.push('.');
            key.push_str(&resource);
        }

        let value = conn.read_string()?;
        conn.read_int()?; // terminator, unused

        attrs.insert(key, value);
    }

    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    enum Scripted {
        Int(i64),
        Str(&'static str),
    }

    use Scripted::{Int, Str};

    /// A scripted peer that replays a canned reply stream.
    struct MockConn {
        reply: VecDeque<Scripted>,
    }

    impl MockConn {
        fn new(reply: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                reply: reply.into_iter().collect(),
            }
        }
    }

    impl Conn for MockConn {
        fn user(&self) -> &str {
            "tester"
        }

        fn read_int(&mut self) -> Result<i64> {
            match self.reply.pop_front() {
                Some(Int(n)) => Ok(n),
                other => panic!("script expected an int, got {}", describe(other)),
            }
        }

        fn read_string(&mut self) -> Result<String> {
            match self.reply.pop_front() {
                Some(Str(s)) => Ok(s.to_string()),
                other => panic!("script expected a string, got {}", describe(other)),
            }
        }

        fn write_int(&mut self, _n: i64) -> Result<()> {
            Ok(())
        }

        fn write_string(&mut self, _s: &str) -> Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn describe(item: Option<Scripted>) -> &'static str {
        match item {
            Some(Int(_)) => "an int",
            Some(Str(_)) => "a string",
            None => "end of script",
        }
    }

    #[test]
    fn query_nodes_parses_server_response() {
        let mut conn = MockConn::new([
            Int(2),
            Int(2),
            Int(0),
            Int(0),
            Int(6),
            Int(2),
            // foo
            Int(0),
            Str("foo"),
            Int(2),
            Int(0),
            Str("state"),
            Int(0),
            Str("free"),
            Int(0),
            Int(0),
            Str("np"),
            Int(0),
            Str("10"),
            Int(0),
            // bar
            Int(0),
            Str("bar"),
            Int(2),
            Int(0),
            Str("state"),
            Int(0),
            Str("down"),
            Int(0),
            Int(0),
            Str("np"),
            Int(0),
            Str("20"),
            Int(0),
        ]);

        let nodes = query_nodes(&mut conn).expect("query nodes");
        assert_eq!(
            nodes,
            vec![
                Node {
                    name: "foo".into(),
                    state: "free".into(),
                    slot_count: 10,
                },
                Node {
                    name: "bar".into(),
                    state: "down".into(),
                    slot_count: 20,
                },
            ]
        );
    }

    #[test]
    fn query_jobs_parses_server_response() {
        let mut conn = MockConn::new([
            Int(2),
            Int(2),
            Int(0),
            Int(0),
            Int(6),
            Int(2),
            // running job with resources
            Int(0),
            Str("101"),
            Int(6),
            Int(0),
            Str("Job_Name"),
            Int(0),
            Str("foo"),
            Int(0),
            Int(0),
            Str("Job_Owner"),
            Int(0),
            Str("alice@example.com"),
            Int(0),
            Int(0),
            Str("job_state"),
            Int(0),
            Str("R"),
            Int(0),
            Int(0),
            Str("exec_host"),
            Int(0),
            Str("node01/1,5-6+node02/3"),
            Int(0),
            Int(0),
            Str("resources_used"),
            Int(1),
            Str("walltime"),
            Str("12:34:56"),
            Int(0),
            Int(0),
            Str("resources_used"),
            Int(1),
            Str("cput"),
            Str("7:08:09"),
            Int(0),
            // queued job without resources
            Int(0),
            Str("102"),
            Int(3),
            Int(0),
            Str("Job_Name"),
            Int(0),
            Str("bar"),
            Int(0),
            Int(0),
            Str("Job_Owner"),
            Int(0),
            Str("bob@example.com"),
            Int(0),
            Int(0),
            Str("job_state"),
            Int(0),
            Str("Q"),
            Int(0),
        ]);

        let jobs = query_jobs(&mut conn).expect("query jobs");
        assert_eq!(
            jobs,
            vec![
                Job {
                    id: "101".into(),
                    name: "foo".into(),
                    owner: "alice@example.com".into(),
                    state: "R".into(),
                    exec_slots: vec![
                        Slot {
                            node: "node01".into(),
                            index: 1,
                        },
                        Slot {
                            node: "node01".into(),
                            index: 5,
                        },
                        Slot {
                            node: "node01".into(),
                            index: 6,
                        },
                        Slot {
                            node: "node02".into(),
                            index: 3,
                        },
                    ],
                    walltime: (12 * 60 + 34) * 60 + 56,
                    cputime: (7 * 60 + 8) * 60 + 9,
                },
                Job {
                    id: "102".into(),
                    name: "bar".into(),
                    owner: "bob@example.com".into(),
                    state: "Q".into(),
                    ..Job::default()
                },
            ]
        );
    }

    #[test]
    fn missing_np_attribute_is_an_error() {
        let mut conn = MockConn::new([
            Int(2),
            Int(2),
            Int(0),
            Int(0),
            Int(6),
            Int(1),
            Int(0),
            Str("foo"),
            Int(1),
            Int(0),
            Str("state"),
            Int(0),
            Str("free"),
            Int(0),
        ]);

        match query_nodes(&mut conn) {
            Err(Error::Attr(attr)) => assert_eq!(attr, "np"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn protocol_mismatch_is_rejected() {
        let mut conn = MockConn::new([Int(1), Int(2)]);
        assert!(matches!(query_nodes(&mut conn), Err(Error::Protocol(_))));
    }

    #[test]
    fn server_error_code_is_rejected() {
        let mut conn = MockConn::new([Int(2), Int(2), Int(15020), Int(0)]);
        match query_jobs(&mut conn) {
            Err(Error::Protocol(detail)) => assert!(detail.contains("15020")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unexpected_reply_choice_is_rejected() {
        let mut conn = MockConn::new([Int(2), Int(2), Int(0), Int(0), Int(1)]);
        assert!(matches!(query_nodes(&mut conn), Err(Error::Protocol(_))));
    }

    #[test]
    fn parses_exec_host_ranges() {
        let slots = parse_exec_host("node01/0-2,7+node02/4").expect("parse");
        let expected: Vec<(&str, u32)> = vec![
            ("node01", 0),
            ("node01", 1),
            ("node01", 2),
            ("node01", 7),
            ("node02", 4),
        ];
        let actual: Vec<(&str, u32)> =
            slots.iter().map(|s| (s.node.as_str(), s.index)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn empty_exec_host_yields_no_slots() {
        assert!(parse_exec_host("").expect("parse").is_empty());
    }

    #[test]
    fn malformed_exec_host_is_rejected() {
        for bad in ["node01", "node01/", "node01/a", "node01/1-b"] {
            assert!(
                matches!(parse_exec_host(bad), Err(Error::BadFormat(_))),
                "input {bad:?}"
            );
        }
    }

    #[test]
    fn parses_clock_fields() {
        assert_eq!(parse_clock("").expect("parse"), 0);
        assert_eq!(parse_clock("90").expect("parse"), 90);
        assert_eq!(parse_clock("1:90").expect("parse"), 150);
        assert_eq!(parse_clock("12:34:56").expect("parse"), 45296);
    }

    #[test]
    fn malformed_clock_is_rejected() {
        for bad in ["x", "1:x", "-1", "1::2"] {
            assert!(
                matches!(parse_clock(bad), Err(Error::BadFormat(_))),
                "input {bad:?}"
            );
        }
    }
}
