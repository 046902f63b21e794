use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::spells::spell::{Spell, SpellId, SpellKind, SpellLine, SpellLineId};
use crate::telemetry::logging;

/// All loaded spell templates and lines, keyed for lookup. Spells are
/// immutable once inserted.
#[derive(Debug, Default, Clone)]
pub struct SpellLibrary {
    spells: HashMap<SpellId, Spell>,
    by_name: HashMap<String, SpellId>,
    lines: HashMap<SpellLineId, SpellLine>,
}

#[derive(Debug, Deserialize)]
struct SpellFile {
    #[serde(default)]
    lines: Vec<SpellLine>,
    #[serde(default)]
    spells: Vec<Spell>,
}

impl SpellLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spell: Spell) -> Result<(), String> {
        if self.spells.contains_key(&spell.id) {
            return Err(format!("spell {:?} already exists", spell.id));
        }
        let key = spell.name.to_ascii_lowercase();
        if let Some(existing) = self.by_name.get(&key) {
            return Err(format!(
                "spell name {} already used by {:?}",
                spell.name, existing
            ));
        }
        self.by_name.insert(key, spell.id);
        self.spells.insert(spell.id, spell);
        Ok(())
    }

    pub fn insert_line(&mut self, line: SpellLine) -> Result<(), String> {
        if self.lines.contains_key(&line.id) {
            return Err(format!("spell line {:?} already exists", line.id));
        }
        self.lines.insert(line.id, line);
        Ok(())
    }

    pub fn get(&self, id: SpellId) -> Option<&Spell> {
        self.spells.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Spell> {
        let key = name.to_ascii_lowercase();
        self.by_name.get(&key).and_then(|id| self.spells.get(id))
    }

    pub fn line(&self, id: SpellLineId) -> Option<&SpellLine> {
        self.lines.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Spell> {
        self.spells.values()
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn load_yaml_str(&mut self, source: &str) -> Result<usize, String> {
        let file: SpellFile = serde_yaml::from_str(source)
            .map_err(|err| format!("spell file parse failed: {err}"))?;
        let mut inserted = 0;
        for line in file.lines {
            self.insert_line(line)?;
        }
        for spell in file.spells {
            self.insert(spell)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Load every `*.yaml` in `dir`. Validation findings are logged, not
    /// fatal; a playable server beats a perfect data set.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, String> {
        let entries = std::fs::read_dir(dir)
            .map_err(|err| format!("spell dir {} read failed: {err}", dir.display()))?;
        let mut total = 0;
        for entry in entries {
            let entry = entry.map_err(|err| format!("spell dir entry failed: {err}"))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
                continue;
            }
            let source = std::fs::read_to_string(&path)
                .map_err(|err| format!("spell file {} read failed: {err}", path.display()))?;
            total += self.load_yaml_str(&source)?;
        }
        for finding in self.validate() {
            logging::log_spell(&format!("spell validation: {finding}"));
        }
        Ok(total)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut findings = Vec::new();
        for spell in self.iter() {
            if spell.name.trim().is_empty() {
                findings.push(format!("spell {:?} missing name", spell.id));
            }
            if spell.leaves_effect() && spell.duration_ms == 0 && spell.frequency_ms == 0 {
                findings.push(format!(
                    "spell {:?} ({}) is a permanent effect; explicit cancel required",
                    spell.id, spell.name
                ));
            }
            if matches!(spell.kind, SpellKind::Chant) {
                if spell.frequency_ms == 0 {
                    findings.push(format!(
                        "chant {:?} ({}) missing pulse frequency",
                        spell.id, spell.name
                    ));
                }
                if spell.concentration_cost == 0 {
                    findings.push(format!(
                        "chant {:?} ({}) has no concentration cost",
                        spell.id, spell.name
                    ));
                }
            }
            if spell.effect_bounds_invalid() {
                findings.push(format!(
                    "spell {:?} ({}) pulse bounds are inverted",
                    spell.id, spell.name
                ));
            }
        }
        findings
    }
}

impl Spell {
    fn effect_bounds_invalid(&self) -> bool {
        self.pulse_lower_bound > self.pulse_upper_bound
    }
}
