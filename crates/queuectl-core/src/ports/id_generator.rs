//! IdGenerator port - ID 生成の抽象化
//!
//! Job id は基本的に呼び出し側が指定する。指定がない場合（CLI の
//! `enqueue --command`）に限り、ここで ULID ベースの id を払い出す。

use ulid::Ulid;

use crate::domain::JobId;
use crate::ports::Clock;

pub const JOB_ID_PREFIX: &str = "job-";

pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

/// ULID ベースの ID 生成器
///
/// Clock から timestamp 部分を取るので、id は生成順にソートできる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        JobId::new(format!("{JOB_ID_PREFIX}{ulid}"))
    }
}
