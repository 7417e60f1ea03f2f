/// Outcome of one cooperative step of an agent's main routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// The routine has more work and wants another step next sweep.
    Continue,
    /// The routine yields control; the agent parks until re-animated by a post.
    Break,
    /// The agent requests orderly teardown.
    Dispose,
}
