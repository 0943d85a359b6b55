pub mod projectmodel;
pub mod reviewmodel;
pub mod submissionmodel;
pub mod transactionmodel;
pub mod usermodel;
pub mod withdrawalmodel;
