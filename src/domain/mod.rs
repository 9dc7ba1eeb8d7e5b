//! Domain layer
//! 명령 트리, 입력 분리/해석, 완성 후보 같은 순수 데이터와 규칙을 외부 I/O 없이 표현한다.

pub mod candidate;
pub mod param_type;
pub mod parser;
pub mod styled;
pub mod tokenizer;
pub mod tree;
