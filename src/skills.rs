use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::error::{AnalyticsError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkillEntry {
    pub dependencies: Vec<String>,
    pub unlocks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SkillDependencyGraph {
    skills: BTreeMap<String, SkillEntry>,
}

impl SkillDependencyGraph {
    /// Builds the graph from `skill -> prerequisites`. Every prerequisite
    /// must itself be listed and the table must be acyclic.
    pub fn from_dependencies(table: BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut skills: BTreeMap<String, SkillEntry> = table
            .keys()
            .map(|skill| (skill.clone(), SkillEntry::default()))
            .collect();

        for (skill, dependencies) in table.iter() {
            for dependency in dependencies {
                if dependency == skill {
                    return Err(AnalyticsError::SkillTable(format!(
                        "{skill} depends on itself"
                    )));
                }
                let Some(entry) = skills.get_mut(dependency) else {
                    return Err(AnalyticsError::SkillTable(format!(
                        "{skill} depends on unknown skill {dependency}"
                    )));
                };
                entry.unlocks.push(skill.clone());
            }
            if let Some(entry) = skills.get_mut(skill) {
                entry.dependencies = dependencies.clone();
            }
        }

        let graph = Self { skills };
        graph.ensure_acyclic()?;
        Ok(graph)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let table: BTreeMap<String, Vec<String>> = serde_json::from_str(raw)
            .map_err(|e| AnalyticsError::SkillTable(format!("invalid skill table: {e}")))?;
        Self::from_dependencies(table)
    }

    pub fn default_curriculum() -> Self {
        let table: BTreeMap<String, Vec<String>> = [
            ("basic_programming", vec![]),
            ("statistics", vec![]),
            ("data_structures", vec!["basic_programming"]),
            ("web_development", vec!["basic_programming"]),
            ("databases", vec!["basic_programming"]),
            ("algorithms", vec!["data_structures"]),
            ("machine_learning", vec!["algorithms", "statistics"]),
            ("system_design", vec!["algorithms", "databases"]),
        ]
        .into_iter()
        .map(|(skill, deps)| {
            (
                skill.to_string(),
                deps.into_iter().map(str::to_string).collect(),
            )
        })
        .collect();

        match Self::from_dependencies(table) {
            Ok(graph) => graph,
            Err(e) => unreachable!("built-in curriculum is invalid: {e}"),
        }
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn contains(&self, skill: &str) -> bool {
        self.skills.contains_key(skill)
    }

    pub fn dependencies(&self, skill: &str) -> Option<&[String]> {
        self.skills.get(skill).map(|e| e.dependencies.as_slice())
    }

    pub fn unlocks(&self, skill: &str) -> Option<&[String]> {
        self.skills.get(skill).map(|e| e.unlocks.as_slice())
    }

    /// Shortest prerequisite chain from a skill the learner already has to
    /// `target`, ending with `target`. Walks prerequisites backwards from the
    /// target breadth-first. `None` when the target is unknown or nothing in
    /// `current_skills` leads to it.
    pub fn learning_path<S: AsRef<str>>(&self, current_skills: &[S], target: &str) -> Option<Vec<String>> {
        if !self.skills.contains_key(target) {
            return None;
        }
        let known: HashSet<&str> = current_skills.iter().map(AsRef::as_ref).collect();

        // skill -> the skill it was reached from, one step closer to target
        let mut towards_target: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([target]);
        let mut queue: VecDeque<&str> = VecDeque::from([target]);

        while let Some(skill) = queue.pop_front() {
            if known.contains(skill) {
                let mut path = vec![skill.to_string()];
                let mut current = skill;
                while let Some(&next) = towards_target.get(current) {
                    path.push(next.to_string());
                    current = next;
                }
                return Some(path);
            }
            for dependency in self.dependencies(skill).unwrap_or_default() {
                if visited.insert(dependency.as_str()) {
                    towards_target.insert(dependency.as_str(), skill);
                    queue.push_back(dependency.as_str());
                }
            }
        }
        None
    }

    fn ensure_acyclic(&self) -> Result<()> {
        let mut remaining: HashMap<&str, usize> = self
            .skills
            .iter()
            .map(|(skill, entry)| (skill.as_str(), entry.dependencies.len()))
            .collect();
        let mut ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(skill, _)| *skill)
            .collect();

        let mut resolved = 0;
        while let Some(skill) = ready.pop() {
            resolved += 1;
            for unlocked in self.unlocks(skill).unwrap_or_default() {
                if let Some(count) = remaining.get_mut(unlocked.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(unlocked.as_str());
                    }
                }
            }
        }

        if resolved == self.skills.len() {
            Ok(())
        } else {
            Err(AnalyticsError::SkillTable(
                "skill dependencies contain a cycle".to_string(),
            ))
        }
    }
}

impl Default for SkillDependencyGraph {
    fn default() -> Self {
        Self::default_curriculum()
    }
}
