//! Conversion of workspace pages into projection records.
//!
//! Property names are those of the team's workspace databases.

use opsdash_db::absences::models::{Absence, AbsenceCategory};
use opsdash_db::clients::models::{Client, ClientStatus};
use opsdash_db::feedback::models::Feedback;
use opsdash_db::projects::models::Project;
use opsdash_db::tasks::models::Task;
use opsdash_db::time_entries::models::TimeEntry;

use super::page::{parse_date, parse_datetime, Page};

/// A record that can be read from a workspace page.
pub trait FromPage: Sized {
    fn from_page(page: &Page) -> Result<Self, String>;
}

impl FromPage for Client {
    fn from_page(page: &Page) -> Result<Self, String> {
        Ok(Client {
            id: page.id,
            name: page.title("Клиент").unwrap_or_default(),
            status: ClientStatus::from_label(&page.status("Статус").unwrap_or_default()),
            source: page.select("Откуда пришел"),
            unique_number: page.unique_id("ID"),
            project_ids: page.relation("Проекты"),
            created_at: page.created_time,
            last_edited_at: page.last_edited_time,
        })
    }
}

impl FromPage for Project {
    fn from_page(page: &Page) -> Result<Self, String> {
        Ok(Project {
            id: page.id,
            name: page.title("Name").unwrap_or_default(),
            status: page.status("Статус"),
            project_type: page.select("Тип проекта"),
            manager_id: page.relation("Менеджер").into_iter().next(),
            sheets_link: page.url("GSL"),
            created_at: page.created_time,
            last_edited_at: page.last_edited_time,
        })
    }
}

impl FromPage for Task {
    fn from_page(page: &Page) -> Result<Self, String> {
        let deadline = page.date("Дедлайн");
        Ok(Task {
            id: page.id,
            title: page.title("Task").unwrap_or_default(),
            status: page.status("Статус"),
            priority: page.select("Приоритет"),
            project_id: page.relation("Продукт").into_iter().next(),
            executor_id: page.people("Исполнитель").into_iter().next(),
            responsible_id: page.people("Ответственный").into_iter().next(),
            parent_id: page.relation("Родительская задача").into_iter().next(),
            estimate: page.number("Оценка"),
            tags: page.multi_select("Теги"),
            start_at: deadline.as_ref().and_then(|d| parse_datetime(&d.start)),
            end_at: deadline
                .as_ref()
                .and_then(|d| d.end.as_deref())
                .and_then(parse_datetime),
            created_at: page.created_time,
            last_edited_at: page.last_edited_time,
        })
    }
}

impl FromPage for TimeEntry {
    fn from_page(page: &Page) -> Result<Self, String> {
        Ok(TimeEntry {
            id: page.id,
            task_id: page.relation("Задача").into_iter().next(),
            employee_id: page.people("Исполнитель").into_iter().next(),
            project_id: page.rollup_relation("Проект").into_iter().next(),
            work_date: page.date("Дата работ").and_then(|d| parse_date(&d.start)),
            total_hours: page.number("Затрачено ч.").unwrap_or(0.0),
            payable_hours: page.number("К оплате ч.").unwrap_or(0.0),
            description: page.title("Что делали").unwrap_or_default(),
            created_at: page.created_time,
            last_edited_at: page.last_edited_time,
        })
    }
}

impl FromPage for Feedback {
    fn from_page(page: &Page) -> Result<Self, String> {
        let directions = page.multi_select("Направление");
        Ok(Feedback {
            id: page.id,
            text: page.title("Name").unwrap_or_default(),
            feedback_type: page.select("Тип"),
            priority: page.select("Приоритет"),
            status: page.status("Статус"),
            direction: (!directions.is_empty()).then(|| directions.join(", ")),
            task_id: page.relation("Задача").into_iter().next(),
            project_id: page.relation("Проект").into_iter().next(),
            created_at: page.created_time,
            last_edited_at: page.last_edited_time,
        })
    }
}

impl FromPage for Absence {
    fn from_page(page: &Page) -> Result<Self, String> {
        let label = page
            .select("Категория")
            .ok_or_else(|| "absence has no category".to_string())?;
        let category = category_from_label(&label)?;

        let period = page
            .date("Период")
            .ok_or_else(|| "absence has no period".to_string())?;
        let period_start = parse_date(&period.start)
            .ok_or_else(|| format!("invalid period start: {}", period.start))?;
        let period_end = match period.end.as_deref() {
            Some(raw) => Some(parse_date(raw).ok_or_else(|| format!("invalid period end: {raw}"))?),
            None => None,
        };

        Ok(Absence {
            id: page.id,
            employee_id: page.relation("Сотрудник").into_iter().next(),
            employee_name: page.rollup_text("Имя сотрудника"),
            category,
            period_start,
            period_end,
            reason: page.title("Причина"),
            created_at: page.created_time,
            last_edited_at: page.last_edited_time,
            notified: false,
        })
    }
}

/// Map a category label as written in the workspace, in Russian or English.
pub fn category_from_label(label: &str) -> Result<AbsenceCategory, String> {
    match label.trim().to_lowercase().as_str() {
        "отпуск" | "vacation" => Ok(AbsenceCategory::Vacation),
        "отгул" | "day off" | "day_off" => Ok(AbsenceCategory::DayOff),
        "форс-мажор" | "force majeure" | "force_majeure" => Ok(AbsenceCategory::ForceMajeure),
        "больничный" | "sick leave" | "sick_leave" => Ok(AbsenceCategory::SickLeave),
        other => Err(format!("unknown absence category: {other}")),
    }
}
