use chrono::{TimeZone, Utc};
use shared::{
    domain::{ClientId, ClientStatus, LeadId, LeadStatus, TaskId, TaskPriority, TaskStatus, UserId},
    protocol::{Client, Lead, Page, Task},
};

pub(crate) fn lead(id: i64, name: &str, status: LeadStatus) -> Lead {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("timestamp");
    Lead {
        id: LeadId(id),
        name: name.to_string(),
        email: format!("{}@lead.test", name.to_lowercase().replace(' ', ".")),
        phone: format!("555-01{id:02}"),
        company: "Acme".to_string(),
        status,
        conversion_status: None,
        conversion_message: None,
        assigned_to_id: UserId(2),
        assigned_to_name: "Eve Employee".to_string(),
        assigned_to_position: Some("Account executive".to_string()),
        assigned_to_email: None,
        created_at: at,
        updated_at: at,
    }
}

pub(crate) fn client(id: i64, name: &str, address: &str) -> Client {
    Client {
        id: ClientId(id),
        name: name.to_string(),
        email: format!("ops@{}.test", name.to_lowercase()),
        phone: String::new(),
        company: name.to_string(),
        address: address.to_string(),
        status: ClientStatus::Active,
        assigned_to_id: UserId(2),
        assigned_to_name: "Eve Employee".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("timestamp"),
    }
}

pub(crate) fn task(id: i64, title: &str, assigned_to: i64, assigned_by: i64) -> Task {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("timestamp");
    Task {
        id: TaskId(id),
        title: title.to_string(),
        description: String::new(),
        status: TaskStatus::Todo,
        priority: TaskPriority::Medium,
        due_date: None,
        lead_id: None,
        assigned_to_id: UserId(assigned_to),
        assigned_to_name: format!("user {assigned_to}"),
        assigned_by_id: UserId(assigned_by),
        assigned_by_name: format!("user {assigned_by}"),
        created_at: at,
        updated_at: at,
    }
}

pub(crate) fn qualified_leads(count: i64) -> Vec<Lead> {
    (1..=count)
        .map(|id| lead(id, &format!("Lead {id}"), LeadStatus::Qualified))
        .collect()
}

/// Splits `items` into pages of the given sizes, each declaring `total_pages`.
pub(crate) fn pages_of<T: Clone>(items: &[T], sizes: &[usize]) -> Vec<Page<T>> {
    let mut start = 0;
    sizes
        .iter()
        .map(|size| {
            let page = Page {
                items: items[start..start + size].to_vec(),
                total_pages: sizes.len() as u32,
                total_elements: items.len() as u64,
            };
            start += size;
            page
        })
        .collect()
}
