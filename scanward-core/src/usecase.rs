//! Use-case registry
//!
//! Every user, admin and system operation of the scheduler is listed here once.
//! The table is indexed by [`UseCaseId`] and checked at compile time: each row
//! must sit at its id's index, and codes must be unique.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UseCaseId {
    UserCreatesJob,
    UserUploadsData,
    UserMarksJobReady,
    UserGetsJobStatus,
    SchedulerStartsJob,
    AdminCancelsJob,
    AdminRestartsJob,
    AdminRestartsJobHard,
    SystemSuspendsJobsOnShutdown,
    SystemResumesSuspendedJobs,
    SystemForceCancelsOrphanedJobs,
    AdminEnablesJobProcessing,
    AdminDisablesJobProcessing,
    AdminRefreshesSchedulerStatus,
    SystemAutoCleanup,
}

/// Registry row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseCase {
    pub id: UseCaseId,
    pub code: &'static str,
    pub title: &'static str,
}

pub const USE_CASES: [UseCase; 15] = [
    UseCase {
        id: UseCaseId::UserCreatesJob,
        code: "UC_USER_CREATES_JOB",
        title: "User creates a new scan job",
    },
    UseCase {
        id: UseCaseId::UserUploadsData,
        code: "UC_USER_UPLOADS_DATA",
        title: "User uploads scan data for a created job",
    },
    UseCase {
        id: UseCaseId::UserMarksJobReady,
        code: "UC_USER_MARKS_JOB_READY",
        title: "User marks a job ready to start",
    },
    UseCase {
        id: UseCaseId::UserGetsJobStatus,
        code: "UC_USER_GETS_JOB_STATUS",
        title: "User fetches job status and result",
    },
    UseCase {
        id: UseCaseId::SchedulerStartsJob,
        code: "UC_SCHEDULER_STARTS_JOB",
        title: "Scheduler claims a job and starts its executors",
    },
    UseCase {
        id: UseCaseId::AdminCancelsJob,
        code: "UC_ADMIN_CANCELS_JOB",
        title: "Admin cancels a running job",
    },
    UseCase {
        id: UseCaseId::AdminRestartsJob,
        code: "UC_ADMIN_RESTARTS_JOB",
        title: "Admin restarts a job and reattaches to running executors",
    },
    UseCase {
        id: UseCaseId::AdminRestartsJobHard,
        code: "UC_ADMIN_RESTARTS_JOB_HARD",
        title: "Admin restarts a job discarding existing executor jobs",
    },
    UseCase {
        id: UseCaseId::SystemSuspendsJobsOnShutdown,
        code: "UC_SYSTEM_SUSPENDS_JOBS_ON_SHUTDOWN",
        title: "System suspends running jobs when the instance shuts down",
    },
    UseCase {
        id: UseCaseId::SystemResumesSuspendedJobs,
        code: "UC_SYSTEM_RESUMES_SUSPENDED_JOBS",
        title: "System requeues suspended jobs",
    },
    UseCase {
        id: UseCaseId::SystemForceCancelsOrphanedJobs,
        code: "UC_SYSTEM_FORCE_CANCELS_ORPHANED_JOBS",
        title: "System cancels jobs whose cancel request was never confirmed",
    },
    UseCase {
        id: UseCaseId::AdminEnablesJobProcessing,
        code: "UC_ADMIN_ENABLES_JOB_PROCESSING",
        title: "Admin enables scheduler job processing",
    },
    UseCase {
        id: UseCaseId::AdminDisablesJobProcessing,
        code: "UC_ADMIN_DISABLES_JOB_PROCESSING",
        title: "Admin disables scheduler job processing",
    },
    UseCase {
        id: UseCaseId::AdminRefreshesSchedulerStatus,
        code: "UC_ADMIN_REFRESHES_SCHEDULER_STATUS",
        title: "Admin triggers a scheduler status refresh",
    },
    UseCase {
        id: UseCaseId::SystemAutoCleanup,
        code: "UC_SYSTEM_AUTO_CLEANUP",
        title: "System deletes finished jobs older than the retention",
    },
];

const fn same_str(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn registry_is_consistent(table: &[UseCase]) -> bool {
    let mut i = 0;
    while i < table.len() {
        if table[i].id as usize != i {
            return false;
        }
        let mut j = i + 1;
        while j < table.len() {
            if same_str(table[i].code, table[j].code) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    registry_is_consistent(&USE_CASES),
    "use case table out of order or has duplicate codes"
);

static REGISTRY: [UseCase; USE_CASES.len()] = USE_CASES;

impl UseCaseId {
    pub fn use_case(self) -> &'static UseCase {
        &REGISTRY[self as usize]
    }

    pub fn code(self) -> &'static str {
        self.use_case().code
    }
}

impl std::fmt::Display for UseCaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
