mod dispatch_tests;
mod presence_tests;
