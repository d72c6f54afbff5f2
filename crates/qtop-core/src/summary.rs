//! Reduction of raw node and job listings into the dashboard model.

use std::collections::HashMap;

use regex::Regex;

use crate::batch::{Job, Node};

/// Everything one refresh produces for the renderer.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub cluster: ClusterSummary,
    pub nodes: Vec<NodeSummary>,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSummary {
    pub running_jobs: usize,
    pub waiting_jobs: usize,
    pub used_slots: usize,
    /// May go slightly negative under scheduler reporting lag; the display
    /// layer clamps.
    pub free_slots: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub name: String,
    pub active: bool,
    pub avail_slots: u32,
    pub used_slots: u32,
    /// Occupants of this node, ordered by occupancy descending.
    pub owners: Vec<OwnerSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSummary {
    pub owner: String,
    pub occupancy: u32,
}

/// One group of jobs sharing `(basename(name), owner, state)`.
#[derive(Debug, Clone, Default)]
pub struct JobSummary {
    pub name: String,
    pub owner: String,
    pub state: String,
    pub count: usize,
    pub occupancy: usize,
    pub host_occupancy: HashMap<String, u32>,
    pub min_walltime: u64,
    pub max_walltime: u64,
    pub cpu_usage: f64,
    pub ids: Vec<String>,
}

/// Reduces one query round into the full dashboard summary.
pub fn summarize(nodes: &[Node], jobs: &[Job]) -> Summary {
    let job_sums = summarize_jobs(jobs);
    Summary {
        cluster: summarize_cluster(nodes, jobs),
        nodes: summarize_nodes(nodes, jobs, &job_sums),
        jobs: job_sums,
    }
}

pub fn summarize_cluster(nodes: &[Node], jobs: &[Job]) -> ClusterSummary {
    let mut sum = ClusterSummary::default();

    let avail_slots: i64 = nodes
        .iter()
        .filter(|node| node.state != "down")
        .map(|node| i64::from(node.slot_count))
        .sum();

    for job in jobs {
        match job.state.as_str() {
            "C" => continue,
            "R" => sum.running_jobs += 1,
            _ => {
                sum.waiting_jobs += 1;
                continue;
            }
        }
        sum.used_slots += job.exec_slots.len();
    }

    sum.free_slots = avail_slots - sum.used_slots as i64;
    sum
}

pub fn summarize_nodes(nodes: &[Node], jobs: &[Job], job_sums: &[JobSummary]) -> Vec<NodeSummary> {
    let mut sums = Vec::with_capacity(nodes.len());
    let mut index = HashMap::new();

    for (i, node) in nodes.iter().enumerate() {
        sums.push(NodeSummary {
            name: node.name.clone(),
            active: node.state != "down",
            avail_slots: node.slot_count,
            used_slots: 0,
            owners: Vec::new(),
        });
        index.insert(node.name.as_str(), i);
    }

    for job in jobs {
        if job.state != "R" {
            continue;
        }
        for slot in &job.exec_slots {
            // Slots on nodes the scheduler no longer reports are dropped.
            if let Some(&i) = index.get(slot.node.as_str()) {
                sums[i].used_slots += 1;
            }
        }
    }

    let mut host_owners: HashMap<&str, HashMap<&str, u32>> = HashMap::new();
    for job in job_sums {
        for (host, occupancy) in &job.host_occupancy {
            if !index.contains_key(host.as_str()) {
                continue;
            }
            *host_owners
                .entry(host.as_str())
                .or_default()
                .entry(job.owner.as_str())
                .or_default() += occupancy;
        }
    }

    for (host, owners) in host_owners {
        let mut owner_sums: Vec<OwnerSummary> = owners
            .into_iter()
            .map(|(owner, occupancy)| OwnerSummary {
                owner: owner.to_string(),
                occupancy,
            })
            .collect();

        owner_sums.sort_by(|a, b| {
            b.occupancy
                .cmp(&a.occupancy)
                .then_with(|| a.owner.cmp(&b.owner))
        });

        sums[index[host]].owners = owner_sums;
    }

    sums
}

pub fn summarize_jobs(jobs: &[Job]) -> Vec<JobSummary> {
    let suffix = Regex::new(r"-\d+$").expect("valid regex");

    // Groups are kept in a vector and addressed through an index map so one
    // pass can both create and mutate them.
    let mut sums: Vec<JobSummary> = Vec::new();
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();

    for job in jobs {
        let name = basename(&suffix, &job.name);
        let key = (name.to_string(), job.owner.clone(), job.state.clone());

        let i = *index.entry(key).or_insert_with(|| {
            sums.push(JobSummary {
                name: name.to_string(),
                owner: job.owner.clone(),
                state: job.state.clone(),
                ..JobSummary::default()
            });
            sums.len() - 1
        });
        let sum = &mut sums[i];

        sum.count += 1;
        sum.ids.push(job.id.clone());

        if job.state != "R" {
            continue;
        }

        sum.occupancy += job.exec_slots.len();
        for slot in &job.exec_slots {
            *sum.host_occupancy.entry(slot.node.clone()).or_default() += 1;
        }

        if sum.min_walltime == 0 || job.walltime < sum.min_walltime {
            sum.min_walltime = job.walltime;
        }
        if sum.max_walltime == 0 || job.walltime > sum.max_walltime {
            sum.max_walltime = job.walltime;
        }

        if job.walltime > 0 {
            let usage = job.cputime as f64 / job.walltime as f64;
            // Running mean; the divisor is the group count so far, which
            // includes non-running members. Inherited behaviour, kept as-is.
            sum.cpu_usage += (usage - sum.cpu_usage) / sum.count as f64;
        }
    }

    sums.sort_by(|a, b| {
        (&a.owner, &a.name, &a.state).cmp(&(&b.owner, &b.name, &b.state))
    });
    sums
}

/// Strips a trailing array-job index (`-<digits>`) from a job name.
fn basename<'a>(suffix: &Regex, name: &'a str) -> &'a str {
    match suffix.find(name) {
        Some(m) => &name[..m.start()],
        None => name,
    }
}
