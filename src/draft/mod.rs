/*!
 * Draft Module
 * The editable, client-local portfolio and its typed field updates
 */
pub mod store;

pub use store::{DraftObserver, DraftStore, SharedDraft, TracingObserver};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_SKILL_LEVEL: u8 = 3;
pub const DEFAULT_SKILL_COLOR: &str = "#8b5cf6";
pub const MIN_SKILL_LEVEL: u8 = 1;
pub const MAX_SKILL_LEVEL: u8 = 5;

/// Display-only project type colors, rotated by list position.
pub const TYPE_COLORS: [&str; 4] = ["blue", "purple", "green", "amber"];

pub fn type_color(index: usize) -> &'static str {
    TYPE_COLORS[index % TYPE_COLORS.len()]
}

pub fn clamp_skill_level(level: i64) -> u8 {
    level.clamp(MIN_SKILL_LEVEL as i64, MAX_SKILL_LEVEL as i64) as u8
}

// ============================================================================
// Image references
// ============================================================================

/// Two-phase image value.
///
/// `Pending` holds a local preview that only exists in this process and is
/// never sent to the backend; `Committed` holds a durable remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ImageRef {
    #[default]
    Empty,
    Pending {
        preview: String,
    },
    Committed {
        url: String,
    },
}

impl ImageRef {
    /// Wrap a stored URL; blank means no image.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        if url.trim().is_empty() {
            ImageRef::Empty
        } else {
            ImageRef::Committed { url }
        }
    }

    /// The URL safe to persist, if any.
    pub fn durable_url(&self) -> Option<&str> {
        match self {
            ImageRef::Committed { url } => Some(url),
            _ => None,
        }
    }

    pub fn preview(&self) -> Option<&str> {
        match self {
            ImageRef::Pending { preview } => Some(preview),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ImageRef::Pending { .. })
    }
}

// ============================================================================
// Draft sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeroSection {
    pub dev_name: String,
    pub title: String,
    pub description: String,
    pub hero_image: ImageRef,
    pub companies: Vec<String>,
}

impl Default for HeroSection {
    fn default() -> Self {
        Self {
            dev_name: String::new(),
            title: String::new(),
            description: String::new(),
            hero_image: ImageRef::Empty,
            companies: vec![String::new()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Skill {
    pub name: String,
    pub level: u8,
    pub color: String,
}

impl Default for Skill {
    fn default() -> Self {
        Self {
            name: String::new(),
            level: DEFAULT_SKILL_LEVEL,
            color: DEFAULT_SKILL_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub degree: String,
    pub institution: String,
    pub year: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AboutSection {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub skills: Vec<Skill>,
    pub education: Vec<Education>,
}

impl Default for AboutSection {
    fn default() -> Self {
        Self {
            title: String::new(),
            subtitle: String::new(),
            description: String::new(),
            skills: vec![Skill::default()],
            education: vec![Education::default()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    /// Locally assigned, unique within the list.
    pub id: u32,
    #[serde(rename = "type")]
    pub project_type: String,
    pub type_color: String,
    pub name: String,
    pub description: String,
    pub image: ImageRef,
    pub source_link: String,
    pub demo_link: String,
}

impl Project {
    pub fn new(id: u32, position: usize) -> Self {
        Self {
            id,
            project_type: String::new(),
            type_color: type_color(position).to_string(),
            name: String::new(),
            description: String::new(),
            image: ImageRef::Empty,
            source_link: String::new(),
            demo_link: String::new(),
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Project::new(1, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocialLink {
    pub platform: String,
    pub icon: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactSection {
    pub email: String,
    pub phone: String,
    pub social_links: Vec<SocialLink>,
}

impl Default for ContactSection {
    fn default() -> Self {
        Self {
            email: String::new(),
            phone: String::new(),
            social_links: vec![SocialLink::default()],
        }
    }
}

/// Client-local portfolio being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    /// Minted once at creation, stable across edits and reloads.
    pub id: String,
    #[serde(default)]
    pub hero: HeroSection,
    #[serde(default)]
    pub about: AboutSection,
    #[serde(default = "default_projects")]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub contact: ContactSection,
}

fn default_projects() -> Vec<Project> {
    vec![Project::default()]
}

impl Default for Draft {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Typed field updates
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum HeroField {
    DevName(String),
    Title(String),
    Description(String),
    HeroImage(ImageRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AboutField {
    Title(String),
    Subtitle(String),
    Description(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContactField {
    Email(String),
    Phone(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkillField {
    Name(String),
    /// Clamped to 1..=5.
    Level(i64),
    Color(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EducationField {
    Degree(String),
    Institution(String),
    Year(String),
    Description(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Type(String),
    Name(String),
    Description(String),
    Image(ImageRef),
    SourceLink(String),
    DemoLink(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocialLinkField {
    Platform(String),
    Icon(String),
    Url(String),
}

/// One field of the draft, addressed by section and (for lists) position.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Hero(HeroField),
    About(AboutField),
    Contact(ContactField),
    Company { index: usize, value: String },
    Skill { index: usize, field: SkillField },
    Education { index: usize, field: EducationField },
    Project { index: usize, field: ProjectField },
    SocialLink { index: usize, field: SocialLinkField },
}

/// Ordered lists inside the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListField {
    Companies,
    Skills,
    Education,
    Projects,
    SocialLinks,
}

impl ListField {
    /// Guarded lists never drop below one entry.
    pub fn is_guarded(self) -> bool {
        !matches!(self, ListField::Projects)
    }

    pub fn label(self) -> &'static str {
        match self {
            ListField::Companies => "companies",
            ListField::Skills => "skills",
            ListField::Education => "education",
            ListField::Projects => "projects",
            ListField::SocialLinks => "socialLinks",
        }
    }
}

impl std::fmt::Display for ListField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Image-bearing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageTarget {
    Hero,
    Project(usize),
}

impl ImageTarget {
    pub fn update(self, image: ImageRef) -> FieldUpdate {
        match self {
            ImageTarget::Hero => FieldUpdate::Hero(HeroField::HeroImage(image)),
            ImageTarget::Project(index) => FieldUpdate::Project {
                index,
                field: ProjectField::Image(image),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("{list} has no entry at index {index} (length {len})")]
    IndexOutOfRange {
        list: ListField,
        index: usize,
        len: usize,
    },

    #[error("{0} must keep at least one entry")]
    LastEntry(ListField),
}

/// Editor tabs, in navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EditorTab {
    #[default]
    Hero,
    About,
    Projects,
    Contact,
}

impl EditorTab {
    pub const ORDER: [EditorTab; 4] = [
        EditorTab::Hero,
        EditorTab::About,
        EditorTab::Projects,
        EditorTab::Contact,
    ];

    fn position(self) -> usize {
        Self::ORDER.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Option<EditorTab> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    pub fn previous(self) -> Option<EditorTab> {
        self.position()
            .checked_sub(1)
            .and_then(|i| Self::ORDER.get(i).copied())
    }

    pub fn is_last(self) -> bool {
        self.next().is_none()
    }
}

// ============================================================================
// Draft operations
// ============================================================================

fn entry_mut<T>(list: &mut [T], field: ListField, index: usize) -> Result<&mut T, DraftError> {
    let len = list.len();
    list.get_mut(index).ok_or(DraftError::IndexOutOfRange {
        list: field,
        index,
        len,
    })
}

impl Draft {
    /// Fresh draft with a newly minted id and one default entry per list.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hero: HeroSection::default(),
            about: AboutSection::default(),
            projects: default_projects(),
            contact: ContactSection::default(),
        }
    }

    pub fn list_len(&self, list: ListField) -> usize {
        match list {
            ListField::Companies => self.hero.companies.len(),
            ListField::Skills => self.about.skills.len(),
            ListField::Education => self.about.education.len(),
            ListField::Projects => self.projects.len(),
            ListField::SocialLinks => self.contact.social_links.len(),
        }
    }

    pub fn apply(&mut self, update: FieldUpdate) -> Result<(), DraftError> {
        match update {
            FieldUpdate::Hero(field) => match field {
                HeroField::DevName(v) => self.hero.dev_name = v,
                HeroField::Title(v) => self.hero.title = v,
                HeroField::Description(v) => self.hero.description = v,
                HeroField::HeroImage(v) => self.hero.hero_image = v,
            },
            FieldUpdate::About(field) => match field {
                AboutField::Title(v) => self.about.title = v,
                AboutField::Subtitle(v) => self.about.subtitle = v,
                AboutField::Description(v) => self.about.description = v,
            },
            FieldUpdate::Contact(field) => match field {
                ContactField::Email(v) => self.contact.email = v,
                ContactField::Phone(v) => self.contact.phone = v,
            },
            FieldUpdate::Company { index, value } => {
                *entry_mut(&mut self.hero.companies, ListField::Companies, index)? = value;
            }
            FieldUpdate::Skill { index, field } => {
                let skill = entry_mut(&mut self.about.skills, ListField::Skills, index)?;
                match field {
                    SkillField::Name(v) => skill.name = v,
                    SkillField::Level(v) => skill.level = clamp_skill_level(v),
                    SkillField::Color(v) => skill.color = v,
                }
            }
            FieldUpdate::Education { index, field } => {
                let entry = entry_mut(&mut self.about.education, ListField::Education, index)?;
                match field {
                    EducationField::Degree(v) => entry.degree = v,
                    EducationField::Institution(v) => entry.institution = v,
                    EducationField::Year(v) => entry.year = v,
                    EducationField::Description(v) => entry.description = v,
                }
            }
            FieldUpdate::Project { index, field } => {
                let project = entry_mut(&mut self.projects, ListField::Projects, index)?;
                match field {
                    ProjectField::Type(v) => project.project_type = v,
                    ProjectField::Name(v) => project.name = v,
                    ProjectField::Description(v) => project.description = v,
                    ProjectField::Image(v) => project.image = v,
                    ProjectField::SourceLink(v) => project.source_link = v,
                    ProjectField::DemoLink(v) => project.demo_link = v,
                }
            }
            FieldUpdate::SocialLink { index, field } => {
                let link = entry_mut(&mut self.contact.social_links, ListField::SocialLinks, index)?;
                match field {
                    SocialLinkField::Platform(v) => link.platform = v,
                    SocialLinkField::Icon(v) => link.icon = v,
                    SocialLinkField::Url(v) => link.url = v,
                }
            }
        }
        Ok(())
    }

    /// Append a default entry to `list`.
    pub fn add_item(&mut self, list: ListField) {
        match list {
            ListField::Companies => self.hero.companies.push(String::new()),
            ListField::Skills => self.about.skills.push(Skill::default()),
            ListField::Education => self.about.education.push(Education::default()),
            ListField::Projects => {
                let next_id = self.projects.iter().map(|p| p.id).max().unwrap_or(0) + 1;
                let position = self.projects.len();
                self.projects.push(Project::new(next_id, position));
            }
            ListField::SocialLinks => self.contact.social_links.push(SocialLink::default()),
        }
    }

    pub fn remove_item(&mut self, list: ListField, index: usize) -> Result<(), DraftError> {
        let len = self.list_len(list);
        if index >= len {
            return Err(DraftError::IndexOutOfRange { list, index, len });
        }
        if list.is_guarded() && len <= 1 {
            return Err(DraftError::LastEntry(list));
        }
        match list {
            ListField::Companies => {
                self.hero.companies.remove(index);
            }
            ListField::Skills => {
                self.about.skills.remove(index);
            }
            ListField::Education => {
                self.about.education.remove(index);
            }
            ListField::Projects => {
                self.projects.remove(index);
            }
            ListField::SocialLinks => {
                self.contact.social_links.remove(index);
            }
        }
        Ok(())
    }

    pub fn image(&self, target: ImageTarget) -> Option<&ImageRef> {
        match target {
            ImageTarget::Hero => Some(&self.hero.hero_image),
            ImageTarget::Project(index) => self.projects.get(index).map(|p| &p.image),
        }
    }

    /// Local previews do not survive a reload; drop them.
    pub fn discard_pending_previews(&mut self) {
        if self.hero.hero_image.is_pending() {
            self.hero.hero_image = ImageRef::Empty;
        }
        for project in &mut self.projects {
            if project.image.is_pending() {
                project.image = ImageRef::Empty;
            }
        }
    }
}
