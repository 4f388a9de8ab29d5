//! The configuration tying a resume to a master profile.

use super::content::{Certification, Education, Experience, Link, Skills};
use super::patch::{EducationPatch, ExperiencePatch, PersonalInfoPatch};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Inclusion rule for one section.
///
/// Wire form: `null` excludes the section, `[]` includes every item, a non-empty array
/// includes exactly the listed ids (or names, for skills). A missing field means `All`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SectionFilter {
    Exclude,
    #[default]
    All,
    Only(Vec<String>),
}

impl SectionFilter {
    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            SectionFilter::All
        } else {
            SectionFilter::Only(keys)
        }
    }

    /// Selects items in their original order. Unknown keys simply match nothing.
    pub fn select<T: Clone>(&self, items: &[T], key: impl Fn(&T) -> &str) -> Vec<T> {
        match self {
            SectionFilter::Exclude => Vec::new(),
            SectionFilter::All => items.to_vec(),
            SectionFilter::Only(keys) => items
                .iter()
                .filter(|item| keys.iter().any(|k| k.as_str() == key(*item)))
                .cloned()
                .collect(),
        }
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, SectionFilter::Exclude)
    }
}

impl Serialize for SectionFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SectionFilter::Exclude => serializer.serialize_none(),
            SectionFilter::All => Vec::<String>::new().serialize(serializer),
            SectionFilter::Only(keys) => keys.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SectionFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Vec<String>>::deserialize(deserializer)? {
            None => SectionFilter::Exclude,
            Some(keys) if keys.is_empty() => SectionFilter::All,
            Some(keys) => SectionFilter::Only(keys),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillSelection {
    pub technical: SectionFilter,
    pub languages: SectionFilter,
    pub tools: SectionFilter,
    pub soft: SectionFilter,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSelection {
    #[serde(default)]
    pub experience_ids: SectionFilter,
    #[serde(default)]
    pub education_ids: SectionFilter,
    #[serde(default)]
    pub certification_ids: SectionFilter,
    #[serde(default)]
    pub link_ids: SectionFilter,
    #[serde(default)]
    pub skills: SkillSelection,
    #[serde(default = "default_true")]
    pub include_personal_info: bool,
    #[serde(default = "default_true")]
    pub include_summary: bool,
}

impl Default for SectionSelection {
    fn default() -> Self {
        Self {
            experience_ids: SectionFilter::All,
            education_ids: SectionFilter::All,
            certification_ids: SectionFilter::All,
            link_ids: SectionFilter::All,
            skills: SkillSelection::default(),
            include_personal_info: true,
            include_summary: true,
        }
    }
}

/// Resume-local edits layered over profile data. The profile itself is never touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_info: Option<PersonalInfoPatch>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub experience_overrides: BTreeMap<String, ExperiencePatch>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub education_overrides: BTreeMap<String, EducationPatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_experience: Vec<Experience>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_education: Vec<Education>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_certifications: Vec<Certification>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_links: Vec<Link>,
    pub additional_skills: Skills,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileLink {
    pub profile_id: String,
    #[serde(default)]
    pub selection: SectionSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<ResumeOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_order: Option<Vec<String>>,
}

impl ProfileLink {
    /// A link that takes everything from the profile.
    pub fn all(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            selection: SectionSelection::default(),
            overrides: None,
            section_order: None,
        }
    }
}
