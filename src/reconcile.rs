//! Mapping between the editor's draft shape and the backend record shape.
//!
//! Both directions are pure and total. The mapping is intentionally lossy in
//! a few places: blank companies and incomplete social links are dropped on
//! the way out, only the first technology comes back as the project type,
//! and pending image previews are never persisted.

use uuid::Uuid;

use crate::api::types::{
    ContactInfo, EducationEntry, PortfolioInput, PortfolioRecord, ProjectEntry, SkillEntry,
    SocialLinkEntry,
};
use crate::draft::{
    clamp_skill_level, type_color, AboutSection, ContactSection, Draft, Education, HeroSection,
    ImageRef, Project, Skill, SocialLink, DEFAULT_SKILL_COLOR, DEFAULT_SKILL_LEVEL,
};
use crate::template::TemplateKind;

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn durable(image: &ImageRef) -> String {
    image.durable_url().unwrap_or_default().to_string()
}

/// Empty lists come back as a single default entry.
fn or_single_default<T: Default>(items: Vec<T>) -> Vec<T> {
    if items.is_empty() {
        vec![T::default()]
    } else {
        items
    }
}

/// Draft → record input.
pub fn to_persistence(draft: &Draft, template: TemplateKind) -> PortfolioInput {
    let companies = draft
        .hero
        .companies
        .iter()
        .filter(|c| !is_blank(c))
        .cloned()
        .collect();

    let skills = draft
        .about
        .skills
        .iter()
        .map(|s| SkillEntry {
            name: s.name.clone(),
            level: Some(i64::from(s.level)),
            color: Some(s.color.clone()),
        })
        .collect();

    let education = draft
        .about
        .education
        .iter()
        .map(|e| EducationEntry {
            degree: e.degree.clone(),
            institution: e.institution.clone(),
            years: e.year.clone(),
            description: e.description.clone(),
        })
        .collect();

    let projects = draft
        .projects
        .iter()
        .enumerate()
        .map(|(index, p)| ProjectEntry {
            name: p.name.clone(),
            description: p.description.clone(),
            technologies: vec![p.project_type.clone()],
            image_url: durable(&p.image),
            live_url: p.demo_link.clone(),
            repo_url: p.source_link.clone(),
            featured: index == 0,
        })
        .collect();

    let social_links = draft
        .contact
        .social_links
        .iter()
        .filter(|l| !is_blank(&l.platform) && !is_blank(&l.url))
        .map(|l| SocialLinkEntry {
            platform: l.platform.clone(),
            icon: l.icon.clone(),
            url: l.url.clone(),
        })
        .collect();

    PortfolioInput {
        template_type: template.tag().to_string(),
        custom_url: None,
        brand_name: draft.hero.dev_name.clone(),
        title: draft.hero.title.clone(),
        description: draft.hero.description.clone(),
        hero_image: durable(&draft.hero.hero_image),
        companies,
        section_about: draft.about.title.clone(),
        section_subtitle: draft.about.subtitle.clone(),
        about_me_description: draft.about.description.clone(),
        skills,
        education,
        projects,
        contact_info: vec![ContactInfo {
            email_address: draft.contact.email.clone(),
            phone_number: draft.contact.phone.clone(),
        }],
        social_links,
        is_public: true,
        tags: Vec::new(),
    }
}

/// Record → draft. Never fails; anything missing falls back to form defaults.
pub fn from_persistence(record: &PortfolioRecord) -> Draft {
    let content = &record.content;

    let id = if is_blank(&record.id) {
        Uuid::new_v4().to_string()
    } else {
        record.id.clone()
    };

    let hero = HeroSection {
        dev_name: content.brand_name.clone(),
        title: content.title.clone(),
        description: content.description.clone(),
        hero_image: ImageRef::from_url(content.hero_image.clone()),
        companies: or_single_default(content.companies.clone()),
    };

    let skills = content
        .skills
        .iter()
        .map(|s| Skill {
            name: s.name.clone(),
            level: s
                .level
                .map(clamp_skill_level)
                .unwrap_or(DEFAULT_SKILL_LEVEL),
            color: s
                .color
                .clone()
                .filter(|c| !is_blank(c))
                .unwrap_or_else(|| DEFAULT_SKILL_COLOR.to_string()),
        })
        .collect();

    let education = content
        .education
        .iter()
        .map(|e| Education {
            degree: e.degree.clone(),
            institution: e.institution.clone(),
            year: e.years.clone(),
            description: e.description.clone(),
        })
        .collect();

    let about = AboutSection {
        title: content.section_about.clone(),
        subtitle: content.section_subtitle.clone(),
        description: content.about_me_description.clone(),
        skills: or_single_default(skills),
        education: or_single_default(education),
    };

    let projects: Vec<Project> = content
        .projects
        .iter()
        .enumerate()
        .map(|(index, p)| Project {
            id: index as u32 + 1,
            project_type: p.technologies.first().cloned().unwrap_or_default(),
            type_color: type_color(index).to_string(),
            name: p.name.clone(),
            description: p.description.clone(),
            image: ImageRef::from_url(p.image_url.clone()),
            source_link: p.repo_url.clone(),
            demo_link: p.live_url.clone(),
        })
        .collect();

    let contact = content.contact_info.first();
    let social_links = content
        .social_links
        .iter()
        .map(|l| SocialLink {
            platform: l.platform.clone(),
            icon: l.icon.clone(),
            url: l.url.clone(),
        })
        .collect();

    Draft {
        id,
        hero,
        about,
        projects: or_single_default(projects),
        contact: ContactSection {
            email: contact.map(|c| c.email_address.clone()).unwrap_or_default(),
            phone: contact.map(|c| c.phone_number.clone()).unwrap_or_default(),
            social_links: or_single_default(social_links),
        },
    }
}
