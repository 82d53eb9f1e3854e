use actix::prelude::{Actor, Context};

use crate::domain::runtime::dispatcher::TaskDispatcher;

impl Actor for TaskDispatcher {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let killed = self.jobs.cancel_all();
        if killed > 0 {
            log::warn!("Dispatcher stopped with {} job(s) still running.", killed);
        }
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.shutdown();
        }
    }
}
