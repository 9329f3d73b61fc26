use std::cell::Cell;
use std::io;
use std::rc::Rc;

use chrono::{Duration, Local, Utc};
use taskroster::models::{NewTask, TaskDuration, TaskPatch, TaskStatus};
use taskroster::storage::TASKS_KEY;
use taskroster::tasks::{parse_batch, UNTITLED_TASK};
use taskroster::{
    AssignmentPolicy, BatchDefaults, Config, MemoryStorage, Roster, RosterError, Storage, StorageError,
};

const MANAGER: &str = "manager@example.com";
const EMPLOYEE_ONE: &str = "employee1@example.com";
const EMPLOYEE_TWO: &str = "employee2@example.com";

fn open_roster() -> Roster<MemoryStorage> {
    Roster::open(MemoryStorage::new(), &Config::default())
        .unwrap()
        .with_seed(7)
}

fn login(roster: &mut Roster<MemoryStorage>, email: &str) {
    roster.login(email, "secret").unwrap();
}

fn new_task(title: &str, days_ahead: i64, duration: Option<TaskDuration>) -> NewTask {
    let start = Utc::now() + Duration::days(days_ahead);
    NewTask {
        title: title.into(),
        description: "Ward round".into(),
        start_date: start,
        end_date: None,
        duration,
        registration_deadline: Some(start - Duration::days(1)),
    }
}

#[test]
fn test_add_task_derives_end_from_duration() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);

    let input = new_task("Vaccination clinic", 5, Some(TaskDuration::new(1, 30)));
    let start = input.start_date;
    let task = roster.add_task(input).unwrap();

    assert_eq!(task.end_date, start + Duration::minutes(90));
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.created_by, 1);
    assert!(task.registered_employees.is_empty());
    assert!(task.assigned_to.is_none());
}

#[test]
fn test_add_task_duration_from_end_or_default() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);

    let mut input = new_task("From end", 5, None);
    input.end_date = Some(input.start_date + Duration::minutes(135));
    let task = roster.add_task(input).unwrap();
    assert_eq!(task.duration, TaskDuration::new(2, 15));

    let task = roster.add_task(new_task("Default", 5, None)).unwrap();
    assert_eq!(task.duration, TaskDuration::new(1, 0));
    assert_eq!(task.end_date - task.start_date, Duration::hours(1));
}

#[test]
fn test_add_task_default_deadline_is_a_week_before_start() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);

    let mut input = new_task("Default deadline", 10, None);
    input.registration_deadline = None;
    let start = input.start_date;
    let task = roster.add_task(input).unwrap();
    assert_eq!(task.registration_deadline, start - Duration::days(7));
}

#[test]
fn test_add_task_rejects_bad_input() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);

    let mut late = new_task("Late deadline", 3, None);
    late.registration_deadline = Some(late.start_date + Duration::hours(1));
    assert!(matches!(roster.add_task(late), Err(RosterError::DeadlineAfterStart { .. })));

    let too_long = new_task("Too long", 3, Some(TaskDuration::new(25, 0)));
    assert!(matches!(roster.add_task(too_long), Err(RosterError::Validation(_))));

    let bad_minutes = new_task("Bad minutes", 3, Some(TaskDuration::new(1, 60)));
    assert!(matches!(roster.add_task(bad_minutes), Err(RosterError::Validation(_))));

    let blank = new_task("   ", 3, None);
    assert!(matches!(roster.add_task(blank), Err(RosterError::Validation(_))));

    assert!(roster.tasks().is_empty());
}

#[test]
fn test_add_task_needs_a_manager() {
    let mut roster = open_roster();
    assert!(matches!(
        roster.add_task(new_task("Anonymous", 3, None)),
        Err(RosterError::NotLoggedIn)
    ));

    login(&mut roster, EMPLOYEE_ONE);
    assert!(matches!(
        roster.add_task(new_task("Employee task", 3, None)),
        Err(RosterError::Forbidden(_))
    ));
    assert!(roster.tasks().is_empty());
}

#[test]
fn test_register_is_idempotent() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let id = roster.add_task(new_task("Triage", 4, None)).unwrap().id;

    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(id).unwrap();
    roster.register_for_task(id).unwrap();
    let task = roster.register_for_task(id).unwrap();

    assert_eq!(task.registered_employees, vec![2]);
}

#[test]
fn test_register_refused_after_deadline() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let mut input = new_task("Closed", 2, None);
    input.registration_deadline = Some(Utc::now() - Duration::hours(1));
    let id = roster.add_task(input).unwrap().id;

    login(&mut roster, EMPLOYEE_ONE);
    assert!(matches!(
        roster.register_for_task(id),
        Err(RosterError::RegistrationClosed(t)) if t == id
    ));
    // No registrants, so the sweep leaves it pending.
    assert_eq!(roster.task(id).unwrap().status, TaskStatus::Pending);
}

#[test]
fn test_register_refused_once_assigned() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let task = roster.add_task(new_task("Assigned early", 6, None)).unwrap();
    assert!(task.registration_deadline > Utc::now());

    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(task.id).unwrap();
    login(&mut roster, MANAGER);
    roster.assign_task(task.id, 2).unwrap();

    login(&mut roster, EMPLOYEE_TWO);
    assert!(matches!(
        roster.register_for_task(task.id),
        Err(RosterError::RegistrationClosed(t)) if t == task.id
    ));
    assert_eq!(roster.task(task.id).unwrap().registered_employees, vec![2]);
}

#[test]
fn test_assignee_can_unregister_and_stays_assigned() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let id = roster.add_task(new_task("Keep the shift", 6, None)).unwrap().id;
    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(id).unwrap();
    login(&mut roster, MANAGER);
    roster.assign_task(id, 2).unwrap();

    login(&mut roster, EMPLOYEE_ONE);
    let task = roster.unregister_from_task(id).unwrap();
    assert!(task.registered_employees.is_empty());
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.assigned_to, Some(2));

    // Still the assignee, so still allowed to complete.
    assert_eq!(roster.complete_task(id).unwrap().status, TaskStatus::Completed);
}

#[test]
fn test_unregister_removes_only_current_user() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let id = roster.add_task(new_task("Night shift", 4, None)).unwrap().id;

    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(id).unwrap();
    login(&mut roster, EMPLOYEE_TWO);
    roster.register_for_task(id).unwrap();

    let task = roster.unregister_from_task(id).unwrap();
    assert_eq!(task.registered_employees, vec![2]);
    let task = roster.unregister_from_task(id).unwrap();
    assert_eq!(task.registered_employees, vec![2]);
}

#[test]
fn test_deadline_passing_assigns_one_registrant() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let input = new_task("Flu clinic", 5, Some(TaskDuration::new(1, 30)));
    let start = input.start_date;
    let id = roster.add_task(input).unwrap().id;
    assert_eq!(roster.task(id).unwrap().end_date, start + Duration::minutes(90));

    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(id).unwrap();
    login(&mut roster, EMPLOYEE_TWO);
    roster.register_for_task(id).unwrap();

    login(&mut roster, MANAGER);
    let task = roster
        .update_task(
            id,
            TaskPatch {
                registration_deadline: Some(Utc::now() - Duration::minutes(1)),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    assert_eq!(task.status, TaskStatus::Assigned);
    let assignee = task.assigned_to.unwrap();
    assert!(assignee == 2 || assignee == 3);
    assert_eq!(task.registered_employees.len(), 2);

    // A second sweep has nothing left to do.
    assert!(roster.refresh().unwrap().is_empty());
    assert_eq!(roster.task(id).unwrap().assigned_to, Some(assignee));
}

#[test]
fn test_sweep_with_first_registered_policy() {
    let mut roster = open_roster();
    roster.set_assignment_policy(AssignmentPolicy::FirstRegistered);
    login(&mut roster, MANAGER);
    let task = roster.add_task(new_task("Blood drive", 5, None)).unwrap();
    let empty = roster.add_task(new_task("Nobody came", 5, None)).unwrap();

    login(&mut roster, EMPLOYEE_TWO);
    roster.register_for_task(task.id).unwrap();
    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(task.id).unwrap();

    let after_deadline = task.registration_deadline + Duration::seconds(1);
    let made = roster.sweep_deadlines(after_deadline).unwrap();

    assert_eq!(made.len(), 1);
    assert_eq!(made[0].task_id, task.id);
    assert_eq!(made[0].user_id, 3);
    assert_eq!(roster.task(empty.id).unwrap().status, TaskStatus::Pending);
}

#[test]
fn test_sweep_skips_deleted_and_inactive_registrants() {
    let mut roster = open_roster();
    roster.set_assignment_policy(AssignmentPolicy::FirstRegistered);
    login(&mut roster, MANAGER);
    let orphan = roster.add_task(new_task("Orphaned", 5, None)).unwrap();
    let shared = roster.add_task(new_task("Shared", 5, None)).unwrap();

    login(&mut roster, EMPLOYEE_TWO);
    roster.register_for_task(orphan.id).unwrap();
    roster.register_for_task(shared.id).unwrap();
    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(shared.id).unwrap();

    login(&mut roster, MANAGER);
    roster.update_user_status(3, false).unwrap();
    let after_deadline = shared.registration_deadline + Duration::seconds(1);
    let made = roster.sweep_deadlines(after_deadline).unwrap();
    assert_eq!(made.len(), 1);
    assert_eq!(made[0].task_id, shared.id);
    assert_eq!(made[0].user_id, 2);

    roster.delete_user(3).unwrap();
    assert!(roster.sweep_deadlines(after_deadline).unwrap().is_empty());
    let orphan = roster.task(orphan.id).unwrap();
    assert_eq!(orphan.status, TaskStatus::Pending);
    assert!(orphan.assigned_to.is_none());
}

#[test]
fn test_manual_assign_to_deleted_user_is_refused() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let id = roster.add_task(new_task("Gone", 5, None)).unwrap().id;
    login(&mut roster, EMPLOYEE_TWO);
    roster.register_for_task(id).unwrap();

    login(&mut roster, MANAGER);
    roster.delete_user(3).unwrap();
    assert!(matches!(roster.assign_task(id, 3), Err(RosterError::UserNotFound(3))));
    assert_eq!(roster.task(id).unwrap().status, TaskStatus::Pending);
}

#[test]
fn test_sweep_ignores_deadline_equal_to_now() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let task = roster.add_task(new_task("Edge", 5, None)).unwrap();
    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(task.id).unwrap();

    assert!(roster.sweep_deadlines(task.registration_deadline).unwrap().is_empty());
}

#[test]
fn test_manual_assign_and_complete() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let id = roster.add_task(new_task("Inventory", 6, None)).unwrap().id;

    assert!(matches!(
        roster.assign_task(id, 2),
        Err(RosterError::NotRegistered { user: 2, .. })
    ));

    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(id).unwrap();
    assert!(matches!(roster.assign_task(id, 2), Err(RosterError::Forbidden(_))));

    login(&mut roster, MANAGER);
    let task = roster.assign_task(id, 2).unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.assigned_to, Some(2));

    // Only the assignee may complete.
    assert!(matches!(roster.complete_task(id), Err(RosterError::Forbidden(_))));
    login(&mut roster, EMPLOYEE_ONE);
    let task = roster.complete_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[test]
fn test_completed_status_is_final() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let id = roster.add_task(new_task("Final", 6, None)).unwrap().id;
    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(id).unwrap();
    login(&mut roster, MANAGER);
    roster.assign_task(id, 2).unwrap();
    login(&mut roster, EMPLOYEE_ONE);
    roster.complete_task(id).unwrap();

    login(&mut roster, MANAGER);
    for status in [TaskStatus::Pending, TaskStatus::Assigned] {
        let result = roster.update_task(
            id,
            TaskPatch {
                status: Some(status),
                assigned_to: Some(2),
                ..TaskPatch::default()
            },
        );
        assert!(matches!(result, Err(RosterError::InvalidTransition { .. })));
    }
    let task = roster
        .update_task(
            id,
            TaskPatch {
                title: Some("Final (renamed)".into()),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(roster.sweep_deadlines(Utc::now() + Duration::days(30)).unwrap().is_empty());
    assert_eq!(roster.task(id).unwrap().status, TaskStatus::Completed);
}

#[test]
fn test_no_transition_back_to_pending() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let id = roster.add_task(new_task("Forward only", 6, None)).unwrap().id;
    login(&mut roster, EMPLOYEE_TWO);
    roster.register_for_task(id).unwrap();
    login(&mut roster, MANAGER);
    roster.assign_task(id, 3).unwrap();

    let result = roster.update_task(
        id,
        TaskPatch {
            status: Some(TaskStatus::Pending),
            ..TaskPatch::default()
        },
    );
    assert!(matches!(
        result,
        Err(RosterError::InvalidTransition { from: TaskStatus::Assigned, to: TaskStatus::Pending, .. })
    ));
}

#[test]
fn test_update_recomputes_end_and_checks_deadline() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let task = roster.add_task(new_task("Reschedule", 6, None)).unwrap();

    let later = task.start_date + Duration::days(1);
    let updated = roster
        .update_task(
            task.id,
            TaskPatch {
                start_date: Some(later),
                duration: Some(TaskDuration::new(3, 45)),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert_eq!(updated.end_date, later + Duration::minutes(225));

    let before_deadline = task.registration_deadline - Duration::hours(1);
    let result = roster.update_task(
        task.id,
        TaskPatch {
            start_date: Some(before_deadline),
            ..TaskPatch::default()
        },
    );
    assert!(matches!(result, Err(RosterError::DeadlineAfterStart { .. })));
    assert_eq!(roster.task(task.id).unwrap().start_date, later);

    login(&mut roster, EMPLOYEE_ONE);
    let result = roster.update_task(
        task.id,
        TaskPatch {
            title: Some("Hijacked".into()),
            ..TaskPatch::default()
        },
    );
    assert!(matches!(result, Err(RosterError::Forbidden(_))));
}

#[test]
fn test_delete_task() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let id = roster.add_task(new_task("Temporary", 2, None)).unwrap().id;

    roster.delete_task(id).unwrap();
    assert!(roster.task(id).is_none());
    assert!(matches!(roster.delete_task(id), Err(RosterError::TaskNotFound(_))));
}

#[test]
fn test_parse_batch() {
    let parsed = parse_batch("Inventory | Ward B\n\n   \n| no title\nFire drill");
    assert_eq!(
        parsed,
        vec![
            ("Inventory".to_string(), "Ward B".to_string()),
            (UNTITLED_TASK.to_string(), "no title".to_string()),
            ("Fire drill".to_string(), String::new()),
        ]
    );
}

#[test]
fn test_add_tasks_batch() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let start = Utc::now() + Duration::days(3);
    let defaults = BatchDefaults {
        start_date: start,
        registration_deadline: Some(start - Duration::days(1)),
        duration: TaskDuration::new(0, 45),
    };

    let created = roster.add_tasks_batch("Linen count|Ward A\nFire drill|", &defaults).unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|t| t.end_date == start + Duration::minutes(45)));
    assert_ne!(created[0].id, created[1].id);

    assert!(matches!(
        roster.add_tasks_batch("  \n ", &defaults),
        Err(RosterError::Validation(_))
    ));
    assert_eq!(roster.tasks().len(), 2);
}

/// Memory storage whose task writes can be made to fail.
struct FlakyStorage {
    inner: MemoryStorage,
    fail_tasks: Rc<Cell<bool>>,
    task_writes: Rc<Cell<usize>>,
}

impl Storage for FlakyStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if key == TASKS_KEY {
            if self.fail_tasks.get() {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source: io::Error::new(io::ErrorKind::Other, "disk full"),
                });
            }
            self.task_writes.set(self.task_writes.get() + 1);
        }
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

#[test]
fn test_batch_is_written_once_or_not_at_all() {
    let fail_tasks = Rc::new(Cell::new(false));
    let task_writes = Rc::new(Cell::new(0));
    let storage = FlakyStorage {
        inner: MemoryStorage::new(),
        fail_tasks: Rc::clone(&fail_tasks),
        task_writes: Rc::clone(&task_writes),
    };
    let mut roster = Roster::open(storage, &Config::default()).unwrap();
    roster.login(MANAGER, "").unwrap();
    let start = Utc::now() + Duration::days(3);
    let defaults = BatchDefaults {
        start_date: start,
        registration_deadline: None,
        duration: TaskDuration::new(1, 0),
    };

    let created = roster.add_tasks_batch("One\nTwo\nThree", &defaults).unwrap();
    assert_eq!(created.len(), 3);
    assert_eq!(task_writes.get(), 1);

    fail_tasks.set(true);
    assert!(matches!(
        roster.add_tasks_batch("Four\nFive", &defaults),
        Err(RosterError::Storage(_))
    ));
    assert_eq!(roster.tasks().len(), 3);

    fail_tasks.set(false);
    let reopened = Roster::open(roster.into_storage(), &Config::default()).unwrap();
    let titles: Vec<&str> = reopened.tasks().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["One", "Two", "Three"]);
}

#[test]
fn test_add_task_far_lead_time_is_an_error() {
    let config = Config {
        deadline_lead_days: 1_000_000_000,
        ..Config::default()
    };
    let mut roster = Roster::open(MemoryStorage::new(), &config).unwrap();
    login(&mut roster, MANAGER);
    let mut input = new_task("No deadline", 3, None);
    input.registration_deadline = None;

    assert!(matches!(roster.add_task(input), Err(RosterError::Validation(_))));
    assert!(roster.tasks().is_empty());
}

#[test]
fn test_task_queries() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    let a = roster.add_task(new_task("A", 3, None)).unwrap();
    let b = roster.add_task(new_task("B", 4, None)).unwrap();

    login(&mut roster, EMPLOYEE_ONE);
    roster.register_for_task(a.id).unwrap();
    let mine: Vec<u64> = roster.user_tasks().unwrap().iter().map(|t| t.id).collect();
    assert_eq!(mine, vec![a.id]);

    login(&mut roster, MANAGER);
    assert_eq!(roster.user_tasks().unwrap().len(), 2);
    assert_eq!(roster.tasks_with_status(TaskStatus::Pending).len(), 2);
    assert!(roster.tasks_with_status(TaskStatus::Completed).is_empty());

    let day = b.start_date.with_timezone(&Local).date_naive();
    let on_day: Vec<u64> = roster.tasks_on(day).iter().map(|t| t.id).collect();
    assert_eq!(on_day, vec![b.id]);

    let names: Vec<String> = roster.registrants(a.id).unwrap().iter().map(|u| u.name.clone()).collect();
    assert_eq!(names, vec!["Employee One".to_string()]);
}

#[test]
fn test_end_minus_start_always_matches_duration() {
    let mut roster = open_roster();
    login(&mut roster, MANAGER);
    for (i, (h, m)) in [(0, 0), (0, 15), (2, 30), (24, 59)].into_iter().enumerate() {
        roster
            .add_task(new_task(&format!("Task {}", i), 3, Some(TaskDuration::new(h, m))))
            .unwrap();
    }
    for t in roster.tasks() {
        assert_eq!((t.end_date - t.start_date).num_minutes(), t.duration.total_minutes());
        assert!(t.registration_deadline <= t.start_date);
    }
}
